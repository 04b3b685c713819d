//! Collaborator traits for the backend under test.
//!
//! [`ResourceClient`] is the narrow CRUD surface the conformance engine uses to
//! submit requests and observe their artifacts. [`AccessReviewer`] answers
//! authorization probes for the access-control sub-suite.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐
//! │ Suite / case │────▶│ResourceClient │ (trait)
//! └──────────────┘     └───────────────┘
//!                        │          │
//!                        ▼          ▼
//!                   real cluster   in-memory fake (tests)
//! ```

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::types::{Certificate, Resource, ResourceKey, ResourceKind, Secret};

/// CRUD client over the supported resource kinds, scoped by namespace.
///
/// The trait is `Send + Sync + 'static` so one client can be shared by all
/// concurrently running cases.
///
/// # Error Handling
///
/// - Missing objects: `ClientError::NotFound`
/// - Stale `resource_version` on update: `ClientError::Conflict`
/// - Backend refusal on create: `ClientError::Rejected`
pub trait ResourceClient: Send + Sync + 'static {
    /// Creates a resource. The returned object carries server-assigned
    /// `generation` and `resource_version`.
    fn create(
        &self,
        resource: Resource,
    ) -> impl Future<Output = Result<Resource, ClientError>> + Send;

    /// Reads the latest observed state of a resource.
    fn get(&self, key: &ResourceKey)
    -> impl Future<Output = Result<Resource, ClientError>> + Send;

    /// Replaces a resource. Fails with `Conflict` when the supplied
    /// `resource_version` is not the latest one.
    fn update(
        &self,
        resource: Resource,
    ) -> impl Future<Output = Result<Resource, ClientError>> + Send;

    /// Deletes a resource.
    fn delete(&self, key: &ResourceKey) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Typed helpers on top of [`ResourceClient`].
pub trait ResourceClientExt: ResourceClient {
    fn create_certificate(
        &self,
        certificate: Certificate,
    ) -> impl Future<Output = Result<Certificate, ClientError>> + Send {
        async move {
            self.create(Resource::Certificate(certificate))
                .await?
                .into_certificate()
        }
    }

    fn get_certificate(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Certificate, ClientError>> + Send {
        let key = ResourceKey::new(ResourceKind::Certificate, namespace, name);
        async move { self.get(&key).await?.into_certificate() }
    }

    fn update_certificate(
        &self,
        certificate: Certificate,
    ) -> impl Future<Output = Result<Certificate, ClientError>> + Send {
        async move {
            self.update(Resource::Certificate(certificate))
                .await?
                .into_certificate()
        }
    }

    fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Secret, ClientError>> + Send {
        let key = ResourceKey::new(ResourceKind::Secret, namespace, name);
        async move { self.get(&key).await?.into_secret() }
    }

    fn update_secret(
        &self,
        secret: Secret,
    ) -> impl Future<Output = Result<Secret, ClientError>> + Send {
        async move { self.update(Resource::Secret(secret)).await?.into_secret() }
    }
}

impl<C: ResourceClient> ResourceClientExt for C {}

/// API verbs checked by the authorization matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Get,
    List,
    Watch,
    Create,
    Update,
    Patch,
    Delete,
    #[serde(rename = "deletecollection")]
    DeleteCollection,
}

impl Verb {
    pub const READ: [Verb; 3] = [Verb::Get, Verb::List, Verb::Watch];
    pub const WRITE: [Verb; 5] = [
        Verb::Create,
        Verb::Update,
        Verb::Patch,
        Verb::Delete,
        Verb::DeleteCollection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Watch => "watch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::DeleteCollection => "deletecollection",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single authorization probe: may `role` perform `verb` on `resource`?
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRequest {
    pub role: String,
    pub verb: Verb,
    /// Plural resource name, e.g. `issuers`.
    pub resource: String,
    pub namespace: String,
}

impl fmt::Display for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} in {}",
            self.role, self.verb, self.resource, self.namespace
        )
    }
}

/// Answers authorization probes. Implementations must be free of side effects.
pub trait AccessReviewer: Send + Sync + 'static {
    fn review(
        &self,
        request: &AccessRequest,
    ) -> impl Future<Output = Result<bool, ClientError>> + Send;
}
