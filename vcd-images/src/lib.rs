//! Machine-image support for vCloud-style platforms.
//!
//! This crate maps the platform's catalog/template object model onto a
//! generic machine-image abstraction: it discovers and caches catalogs,
//! resolves catalog items into fully-populated image records, captures a
//! workload into a new template, and publishes captured templates back into
//! the account's catalog. Images map to vApp templates held in catalogs.
//!
//! The low-level transport client and the compute service are external
//! collaborators consumed through the [`transport::Transport`] and
//! [`compute::ComputeServices`] traits.

use std::sync::Arc;

use cache::ScopedCaches;
use compute::ComputeServices;
use model::{CacheScope, MachineImageFormat};
use transport::Transport;
use vcd_core::Result;

mod cache;
mod capture;
mod catalog;
mod images;
mod template;

pub mod compute;
pub mod model;
pub mod transport;
pub mod xml;

pub use catalog::STANDARD_CATALOG;
pub use model::{
    Architecture, Catalog, ImageFilter, MachineImage, MachineImageState, NetworkDefaults, Platform,
};
pub use vcd_core::{Result as VcdResult, VcdError};

/// Catalog, template, and capture support for one (account, region) scope.
///
/// Cheap to clone; clones share the underlying caches and refresh mutexes,
/// which is what makes the single-refresh guarantee hold across callers.
#[derive(Clone)]
pub struct TemplateSupport {
    pub(crate) scope: CacheScope,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) compute: Arc<dyn ComputeServices>,
    pub(crate) caches: ScopedCaches,
}

impl TemplateSupport {
    pub fn new(
        scope: CacheScope,
        transport: Arc<dyn Transport>,
        compute: Arc<dyn ComputeServices>,
    ) -> Self {
        TemplateSupport {
            scope,
            transport,
            compute,
            caches: ScopedCaches::new(),
        }
    }

    pub fn scope(&self) -> &CacheScope {
        &self.scope
    }

    /// The platform's term for an image.
    pub fn provider_term(&self) -> &'static str {
        "vApp Template"
    }

    /// The single format templates are stored in.
    pub fn list_supported_formats(&self) -> Vec<MachineImageFormat> {
        vec![MachineImageFormat::Vmdk]
    }

    /// Image sharing is unsupported; the share list is always empty.
    pub fn list_shares(&self, _image_id: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
