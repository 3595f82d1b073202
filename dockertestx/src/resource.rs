use crate::options::port_label;
use errors::DockerTestError;
use testcontainers::core::ContainerPort;
use testcontainers::{ContainerAsync, GenericImage};

/// A running container started by a `Pool`.
///
/// The container is removed when `purge` is called, or when the resource is
/// dropped.
pub struct Resource {
    service: String,
    image: String,
    container: ContainerAsync<GenericImage>
}

impl Resource {
    pub(crate) fn new(
        service: impl Into<String>,
        image: impl Into<String>,
        container: ContainerAsync<GenericImage>,
    ) -> Self {
        Self {
            service: service.into(),
            image: image.into(),
            container
        }
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container(&self) -> &ContainerAsync<GenericImage> {
        &self.container
    }

    /// Host port mapped to `port` inside the container.
    pub async fn mapped_port(&self, port: ContainerPort) -> Result<u16, DockerTestError> {
        self.container
            .get_host_port_ipv4(port)
            .await
            .map_err(|_| DockerTestError::NoHostPort {
                service: self.service.clone(),
                port: port_label(port)
            })
    }

    /// Host the mapped ports are reachable on.
    pub async fn host(&self) -> Result<String, DockerTestError> {
        self.container
            .get_host()
            .await
            .map(|host| host.to_string())
            .map_err(|e| DockerTestError::StartFailed {
                service: self.service.clone(),
                reason: e.to_string()
            })
    }

    /// `host:port` address for `port` inside the container.
    pub async fn host_port(&self, port: ContainerPort) -> Result<String, DockerTestError> {
        let host = self.host().await?;
        let mapped = self.mapped_port(port).await?;
        Ok(format!("{}:{}", host, mapped))
    }

    /// Stop and remove the container.
    pub async fn purge(self) -> Result<(), DockerTestError> {
        let service = self.service;
        self.container
            .rm()
            .await
            .map_err(|e| DockerTestError::PurgeFailed {
                service,
                reason: e.to_string()
            })
    }

    /// Remove the container after a failed start-up. Removal errors are
    /// logged, not returned.
    pub(crate) async fn discard(self) {
        if let Err(e) = self.purge().await {
            tracing::warn!("{}", e);
        }
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("service", &self.service)
            .field("image", &self.image)
            .field("id", &self.container.id())
            .finish()
    }
}
