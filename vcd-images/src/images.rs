//! The image listing surface and its refresh coordination.
//!
//! A full listing walks every private catalog and loads every catalog item
//! in each, so its cost grows with the account's catalog-item count. The
//! per-scope refresh mutex guarantees at most one in-flight full refresh per
//! (account, region): callers arriving during a refresh either get a fresh
//! cache hit or block on the mutex and reuse the holder's result.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{attrs, Catalog, ImageFilter, MachineImage};
use crate::transport::Resource;
use crate::xml;
use crate::TemplateSupport;
use vcd_core::{Result, VcdError};

impl TemplateSupport {
    /// Lists the account's private images, refreshing through the per-scope
    /// mutex on a cache miss.
    pub fn list_images(&self, filter: Option<&ImageFilter>) -> Result<Arc<Vec<MachineImage>>> {
        if let Some(hit) = self.caches.images.get(&self.scope) {
            return Ok(hit);
        }

        let lock = self.caches.refresh_lock(&self.scope);
        let _guard = lock
            .lock()
            .map_err(|_| VcdError::Internal("image refresh lock poisoned".to_string()))?;

        // A holder we were waiting on may have just repopulated the cache.
        if let Some(hit) = self.caches.images.get(&self.scope) {
            debug!(account = %self.scope.account, "reusing image list from concurrent refresh");
            return Ok(hit);
        }

        let mut images = Vec::new();
        for catalog in self.list_private_catalogs()?.iter() {
            self.collect_catalog_images(catalog, filter, &mut images)?;
        }
        let images = Arc::new(images);
        self.caches.images.insert(self.scope.clone(), images.clone());
        Ok(images)
    }

    /// Walks every public catalog; uncached, recomputed per call.
    pub fn search_public_images(&self, filter: Option<&ImageFilter>) -> Result<Vec<MachineImage>> {
        let mut images = Vec::new();
        for catalog in self.list_public_catalogs()?.iter() {
            self.collect_catalog_images(catalog, filter, &mut images)?;
        }
        Ok(images)
    }

    /// Loads every item of one catalog, stamping the owner and catalog-item
    /// id on each accepted image. Missing documents are skipped with a
    /// warning; the listing continues.
    fn collect_catalog_images(
        &self,
        catalog: &Catalog,
        filter: Option<&ImageFilter>,
        out: &mut Vec<MachineImage>,
    ) -> Result<()> {
        let Some(body) = self.transport.get(Resource::Catalog, &catalog.catalog_id)? else {
            warn!(
                catalog_id = %catalog.catalog_id,
                account = %self.scope.account,
                "unable to find catalog indicated by org"
            );
            return Ok(());
        };
        let doc = xml::parse(&body)?;
        for cnode in xml::descendants_named(&doc, "Catalog") {
            for wrapper in xml::children_named(cnode, "CatalogItems") {
                for item in xml::children_named(wrapper, "CatalogItem") {
                    let Some(href) = xml::attr(item, "href") else {
                        continue;
                    };
                    let catalog_item_id = self.transport.to_id(href);
                    let Some(mut image) =
                        self.load_template(&catalog.owner, &catalog_item_id, catalog.published)?
                    else {
                        continue;
                    };
                    if filter.map_or(true, |f| f.matches(&image)) {
                        image.owner = catalog.owner.clone();
                        image.set_attribute(attrs::CATALOG_ITEM_ID, catalog_item_id);
                        out.push(image);
                    }
                }
            }
        }
        Ok(())
    }

    /// Finds an image by identifier, scanning private images first and the
    /// public library second.
    pub fn get_image(&self, image_id: &str) -> Result<Option<MachineImage>> {
        for image in self.list_images(None)?.iter() {
            if image.image_id == image_id {
                return Ok(Some(image.clone()));
            }
        }
        for image in self.search_public_images(None)? {
            if image.image_id == image_id {
                return Ok(Some(image));
            }
        }
        Ok(None)
    }

    /// Deletes a template and, when the image was published, its catalog item.
    pub fn remove(&self, image_id: &str) -> Result<()> {
        let image = self
            .get_image(image_id)?
            .ok_or_else(|| VcdError::not_found("image", image_id))?;
        self.transport.delete(Resource::VAppTemplate, image_id)?;
        if let Some(catalog_item_id) = image.attribute(attrs::CATALOG_ITEM_ID) {
            self.transport.delete(Resource::CatalogItem, catalog_item_id)?;
        }
        Ok(())
    }

    /// True when the image exists and came from a published catalog.
    pub fn is_image_shared_with_public(&self, image_id: &str) -> Result<bool> {
        Ok(self
            .get_image(image_id)?
            .is_some_and(|image| image.is_public()))
    }
}
