//! RabbitMQ container with an AMQP connection, plus helpers that declare
//! topology, publish and consume.
//!
//! Every helper works on its own channel and closes it before returning. A
//! `MessageConsumer` keeps its channel open until `cancel` is called.

use crate::fixture::{CloseError, Fixture, Teardown};
use crate::options::{HostOption, RunOption, RunOptions, apply_host_options, apply_run_options};
use crate::pool::Pool;
use async_trait::async_trait;
use errors::{DockerTestError, FixtureError};
use lapin::options::{
    BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions, ConfirmSelectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, Queue};
use testcontainers::core::ContainerPort;

pub use lapin::ExchangeKind;

pub const DEFAULT_RABBITMQ_IMAGE: &str = "rabbitmq";
pub const DEFAULT_RABBITMQ_TAG: &str = "3-management";
pub const AMQP_PORT: ContainerPort = ContainerPort::Tcp(5672);

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

const REPLY_SUCCESS: u16 = 200;

#[async_trait]
impl Teardown for Connection {
    async fn close(&self) -> Result<(), CloseError> {
        Connection::close(self, REPLY_SUCCESS, "OK").await?;
        Ok(())
    }
}

/// Flags for `prep_queue`. All default to `false`.
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub exclusive: bool,
    pub no_wait: bool,
    pub arguments: FieldTable
}

impl QueueOptions {
    fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            passive: false,
            durable: self.durable,
            exclusive: self.exclusive,
            auto_delete: self.auto_delete,
            nowait: self.no_wait
        }
    }
}

/// Flags for `prep_exchange`. All default to `false`.
#[derive(Debug, Clone, Default)]
pub struct ExchangeOptions {
    pub durable: bool,
    pub auto_delete: bool,
    pub internal: bool,
    pub no_wait: bool,
    pub arguments: FieldTable
}

impl ExchangeOptions {
    fn declare_options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            passive: false,
            durable: self.durable,
            auto_delete: self.auto_delete,
            internal: self.internal,
            nowait: self.no_wait
        }
    }
}

/// `rabbitmq:3-management` with the `guest` account.
pub fn rabbitmq_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_RABBITMQ_IMAGE, DEFAULT_RABBITMQ_TAG);
    opts.env = vec![
        "RABBITMQ_DEFAULT_USER=guest".to_string(),
        "RABBITMQ_DEFAULT_PASS=guest".to_string(),
    ];
    opts.exposed_ports = vec![AMQP_PORT];
    opts
}

/// AMQP URL on the default vhost, with credentials from the final options.
pub fn amqp_url(opts: &RunOptions, host_port: &str) -> String {
    format!(
        "amqp://{}:{}@{}/%2f",
        opts.env_value("RABBITMQ_DEFAULT_USER"),
        opts.env_value("RABBITMQ_DEFAULT_PASS"),
        host_port
    )
}

pub async fn run_rabbitmq() -> Result<Fixture<Connection>, DockerTestError> {
    run_rabbitmq_with_options(Vec::new(), Vec::new()).await
}

pub async fn run_rabbitmq_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<Connection>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(rabbitmq_defaults(), run_opts);
    let url_opts = opts.clone();
    let resource = pool
        .run_with_options("rabbitmq", opts, apply_host_options(host_opts))
        .await?;

    let host_port = match resource.host_port(AMQP_PORT).await {
        Ok(host_port) => host_port,
        Err(e) => {
            resource.discard().await;
            return Err(e);
        }
    };
    tracing::info!("RabbitMQ container is running on host port '{}'", host_port);

    let url = amqp_url(&url_opts, &host_port);
    let url = url.as_str();
    match pool
        .retry("rabbitmq", || {
            Connection::connect(url, ConnectionProperties::default())
        })
        .await
    {
        Ok(conn) => Ok(Fixture::new(conn, resource)),
        Err(e) => {
            resource.discard().await;
            Err(e)
        }
    }
}

async fn open_channel(conn: &Connection) -> Result<Channel, FixtureError> {
    conn.create_channel()
        .await
        .map_err(|e| FixtureError::ChannelFailed {
            reason: e.to_string()
        })
}

async fn close_channel(channel: &Channel) {
    if let Err(e) = channel.close(REPLY_SUCCESS, "OK").await {
        tracing::warn!("failed to close AMQP channel {}: {}", channel.id(), e);
    }
}

pub async fn prep_queue(
    conn: &Connection,
    name: &str,
    opts: &QueueOptions,
) -> Result<Queue, FixtureError> {
    let channel = open_channel(conn).await?;
    let result = channel
        .queue_declare(name, opts.declare_options(), opts.arguments.clone())
        .await;
    close_channel(&channel).await;

    result.map_err(|e| FixtureError::DeclareFailed {
        kind: "queue".to_string(),
        name: name.to_string(),
        reason: e.to_string()
    })
}

pub async fn prep_exchange(
    conn: &Connection,
    name: &str,
    kind: ExchangeKind,
    opts: &ExchangeOptions,
) -> Result<(), FixtureError> {
    let channel = open_channel(conn).await?;
    let result = channel
        .exchange_declare(name, kind, opts.declare_options(), opts.arguments.clone())
        .await;
    close_channel(&channel).await;

    result.map_err(|e| FixtureError::DeclareFailed {
        kind: "exchange".to_string(),
        name: name.to_string(),
        reason: e.to_string()
    })
}

pub async fn prep_binding(
    conn: &Connection,
    queue: &str,
    exchange: &str,
    routing_key: &str,
    arguments: FieldTable,
) -> Result<(), FixtureError> {
    let channel = open_channel(conn).await?;
    let result = channel
        .queue_bind(queue, exchange, routing_key, QueueBindOptions::default(), arguments)
        .await;
    close_channel(&channel).await;

    result.map_err(|e| FixtureError::BindFailed {
        queue: queue.to_string(),
        exchange: exchange.to_string(),
        reason: e.to_string()
    })
}

/// Publish `body` on a channel in confirm mode and wait for the broker's
/// acknowledgement.
///
/// `properties` without a content type are sent as `text/plain`. A nack, or
/// the broker closing the channel (e.g. for an unknown exchange), is a
/// `PublishFailed` error.
pub async fn publish_message(
    conn: &Connection,
    exchange: &str,
    routing_key: &str,
    body: &[u8],
    properties: BasicProperties,
) -> Result<(), FixtureError> {
    let properties = with_default_content_type(properties);
    let channel = open_channel(conn).await?;

    let result = async {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties
            )
            .await?
            .await
    }
    .await;
    close_channel(&channel).await;

    match result {
        Ok(confirmation) => check_confirmation(exchange, confirmation),
        Err(e) => Err(publish_failed(exchange, e.to_string()))
    }
}

fn check_confirmation(exchange: &str, confirmation: Confirmation) -> Result<(), FixtureError> {
    match confirmation {
        Confirmation::Ack(None) => Ok(()),
        Confirmation::Ack(Some(_)) => Err(publish_failed(
            exchange,
            "message was returned as unroutable".to_string()
        )),
        Confirmation::Nack(_) => Err(publish_failed(
            exchange,
            "message was nacked by the broker".to_string()
        )),
        Confirmation::NotRequested => Err(publish_failed(
            exchange,
            "channel is not in confirm mode".to_string()
        ))
    }
}

fn publish_failed(exchange: &str, reason: String) -> FixtureError {
    FixtureError::PublishFailed {
        exchange: exchange.to_string(),
        reason
    }
}

fn with_default_content_type(properties: BasicProperties) -> BasicProperties {
    if properties.content_type().is_some() {
        properties
    } else {
        properties.with_content_type(DEFAULT_CONTENT_TYPE.into())
    }
}

/// Deliveries from one queue on a dedicated channel.
///
/// Deliveries are not auto-acknowledged; ack each one through its `acker`.
pub struct MessageConsumer {
    channel: Channel,
    consumer: Consumer,
    tag: String
}

impl MessageConsumer {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The delivery stream; poll it with `futures_util::StreamExt::next`.
    pub fn deliveries(&mut self) -> &mut Consumer {
        &mut self.consumer
    }

    /// Cancel the consumer and close its channel. Failures are logged.
    pub async fn cancel(self) {
        if let Err(e) = self
            .channel
            .basic_cancel(&self.tag, BasicCancelOptions::default())
            .await
        {
            tracing::warn!("failed to cancel consumer {}: {}", self.tag, e);
        }
        close_channel(&self.channel).await;
    }
}

impl std::fmt::Debug for MessageConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("channel", &self.channel.id())
            .field("tag", &self.tag)
            .finish()
    }
}

/// Start consuming `queue` under a fresh consumer tag.
pub async fn consume_messages(
    conn: &Connection,
    queue: &str,
) -> Result<MessageConsumer, FixtureError> {
    let channel = open_channel(conn).await?;
    let tag = consumer_tag();

    match channel
        .basic_consume(queue, &tag, BasicConsumeOptions::default(), FieldTable::default())
        .await
    {
        Ok(consumer) => Ok(MessageConsumer {
            channel,
            consumer,
            tag
        }),
        Err(e) => {
            close_channel(&channel).await;
            Err(FixtureError::ConsumeFailed {
                queue: queue.to_string(),
                reason: e.to_string()
            })
        }
    }
}

fn consumer_tag() -> String {
    format!("dockertestx-{}", uuid::Uuid::new_v4())
}
