//! The transport-client boundary.
//!
//! Authenticated request plumbing, sessions, and resource-reference
//! bookkeeping live in the transport client, not here. This crate consumes
//! the client through [`Transport`] and only ever sees raw response bodies.

use vcd_core::Result;

/// The vCloud document namespace used when composing request bodies.
pub const VCLOUD_NS: &str = "http://www.vmware.com/vcloud/v1.5";

/// The OVF envelope namespace, referenced by capture request bodies.
pub const OVF_NS: &str = "http://schemas.dmtf.org/ovf/envelope/1";

/// Resource kinds the orchestration layer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Org,
    Vdc,
    VApp,
    VAppTemplate,
    Catalog,
    CatalogItem,
}

impl Resource {
    /// The platform media type identifying documents of this kind.
    pub fn media_type(self) -> &'static str {
        match self {
            Resource::Org => "application/vnd.vmware.vcloud.org+xml",
            Resource::Vdc => "application/vnd.vmware.vcloud.vdc+xml",
            Resource::VApp => "application/vnd.vmware.vcloud.vApp+xml",
            Resource::VAppTemplate => "application/vnd.vmware.vcloud.vAppTemplate+xml",
            Resource::Catalog => "application/vnd.vmware.vcloud.catalog+xml",
            Resource::CatalogItem => "application/vnd.vmware.vcloud.catalogItem+xml",
        }
    }
}

/// Media types for request payloads that are not resource documents.
pub mod media_types {
    pub const CAPTURE_VAPP_PARAMS: &str =
        "application/vnd.vmware.vcloud.captureVAppParams+xml";
    pub const ADMIN_CATALOG: &str = "application/vnd.vmware.admin.catalog+xml";
}

/// Action names used for request tracing by transport implementations.
pub mod actions {
    pub const CAPTURE_VAPP: &str = "captureVApp";
    pub const CREATE_CATALOG: &str = "createCatalog";
    pub const PUBLISH: &str = "publish";
}

/// The low-level client that issues authenticated requests against the
/// platform and returns raw response bodies.
pub trait Transport: Send + Sync {
    /// Fetches a resource document; `None` when the resource does not exist.
    fn get(&self, resource: Resource, id: &str) -> Result<Option<String>>;

    /// Issues an action request and returns the raw response body.
    fn post(&self, action: &str, url: &str, media_type: &str, body: &str) -> Result<String>;

    /// Deletes a resource.
    fn delete(&self, resource: Resource, id: &str) -> Result<()>;

    /// Blocks until the asynchronous task referenced by `response` reaches a
    /// terminal state; fails when the task fails.
    fn wait_for(&self, response: &str) -> Result<()>;

    /// Translates an opaque identifier into the resource's URL.
    fn to_url(&self, resource: Resource, id: &str) -> String;

    /// Translates an opaque identifier into the resource's admin URL.
    fn to_admin_url(&self, resource: Resource, id: &str) -> String;

    /// Translates a resource reference back into an opaque identifier.
    fn to_id(&self, href: &str) -> String;

    /// Resolves the display name of the organization behind `href`.
    fn org_name(&self, href: &str) -> Result<String>;
}
