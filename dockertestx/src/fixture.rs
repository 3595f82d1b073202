use crate::resource::Resource;
use async_trait::async_trait;
use std::ops::{Deref, DerefMut};

pub type CloseError = Box<dyn std::error::Error + Send + Sync>;

/// Client-side shutdown run before a fixture's container is removed.
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn close(&self) -> Result<(), CloseError>;
}

/// A connected client together with the container it talks to.
///
/// Dereferences to the client. Call `cleanup` to close the client and remove
/// the container; dropping the fixture removes the container as well.
#[derive(Debug)]
pub struct Fixture<C> {
    client: C,
    resource: Resource
}

impl<C> Fixture<C> {
    pub(crate) fn new(client: C, resource: Resource) -> Self {
        Self { client, resource }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn into_parts(self) -> (C, Resource) {
        (self.client, self.resource)
    }
}

impl<C: Teardown> Fixture<C> {
    /// Close the client, then remove the container. Failures are logged.
    pub async fn cleanup(self) {
        let service = self.resource.service().to_string();
        if let Err(e) = self.client.close().await {
            tracing::warn!("failed to close {} client: {}", service, e);
        }
        if let Err(e) = self.resource.purge().await {
            tracing::warn!("{}", e);
        }
    }
}

impl<C> Deref for Fixture<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C> DerefMut for Fixture<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.client
    }
}
