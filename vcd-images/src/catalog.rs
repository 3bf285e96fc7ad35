//! Catalog discovery and template publishing.
//!
//! Catalogs hang off the account's organization document as "down" links with
//! the catalog media type. Each catalog document names itself, declares its
//! published flag, and links back "up" to the organization that owns it; a
//! catalog with no resolvable up link belongs to the platform at large and is
//! owned by the [`Catalog::PUBLIC_OWNER`] sentinel.

use std::sync::Arc;

use tracing::warn;

use crate::model::Catalog;
use crate::transport::{actions, media_types, Resource, VCLOUD_NS};
use crate::xml;
use crate::{MachineImage, TemplateSupport};
use vcd_core::{Result, VcdError};

/// Name of the catalog that captured templates are published into when the
/// account has no better candidate.
pub const STANDARD_CATALOG: &str = "Standard Catalog";

const STANDARD_CATALOG_DESCRIPTION: &str = "Standard catalog for custom vApp templates";

impl TemplateSupport {
    pub(crate) fn list_public_catalogs(&self) -> Result<Arc<Vec<Catalog>>> {
        self.list_catalogs(true)
    }

    pub(crate) fn list_private_catalogs(&self) -> Result<Arc<Vec<Catalog>>> {
        self.list_catalogs(false)
    }

    /// Lists catalogs whose published flag matches `published`, cached for 30
    /// minutes per (account, region). A cache hit performs no remote calls.
    fn list_catalogs(&self, published: bool) -> Result<Arc<Vec<Catalog>>> {
        let cache = if published {
            &self.caches.public_catalogs
        } else {
            &self.caches.private_catalogs
        };
        if let Some(hit) = cache.get(&self.scope) {
            return Ok(hit);
        }
        let catalogs = Arc::new(self.fetch_catalogs(published)?);
        cache.insert(self.scope.clone(), catalogs.clone());
        Ok(catalogs)
    }

    /// Fetches the org document once and follows every catalog "down" link.
    /// An account without an org document simply has no catalogs.
    fn fetch_catalogs(&self, published: bool) -> Result<Vec<Catalog>> {
        let Some(body) = self.transport.get(Resource::Org, &self.scope.region)? else {
            return Ok(Vec::new());
        };
        let doc = xml::parse(&body)?;
        let mut list = Vec::new();
        for link in xml::descendants_named(&doc, "Link") {
            let is_down = xml::attr(link, "rel").is_some_and(|r| r.eq_ignore_ascii_case("down"));
            let is_catalog =
                xml::attr(link, "type") == Some(Resource::Catalog.media_type());
            if !(is_down && is_catalog) {
                continue;
            }
            let Some(href) = xml::attr(link, "href") else {
                continue;
            };
            if let Some(catalog) = self.get_catalog(published, href)? {
                list.push(catalog);
            }
        }
        Ok(list)
    }

    /// Fetches a single catalog document and projects it, or `None` when the
    /// document is missing or its published flag does not match.
    pub(crate) fn get_catalog(&self, published: bool, href: &str) -> Result<Option<Catalog>> {
        let catalog_id = self.transport.to_id(href);
        let Some(body) = self.transport.get(Resource::Catalog, &catalog_id)? else {
            warn!(
                catalog_id,
                account = %self.scope.account,
                "unable to find catalog indicated by org"
            );
            return Ok(None);
        };
        let doc = xml::parse(&body)?;
        for cnode in xml::descendants_named(&doc, "Catalog") {
            let name = xml::attr(cnode, "name").unwrap_or_default().to_string();
            let mut owner = Catalog::PUBLIC_OWNER.to_string();
            let mut is_published = false;

            for child in cnode.children().filter(roxmltree::Node::is_element) {
                if xml::name_is(child, "IsPublished") {
                    is_published =
                        xml::text(child).is_some_and(|t| t.eq_ignore_ascii_case("true"));
                } else if xml::name_is(child, "Link") {
                    let is_up =
                        xml::attr(child, "rel").is_some_and(|r| r.eq_ignore_ascii_case("up"));
                    let is_org =
                        xml::attr(child, "type") == Some(Resource::Org.media_type());
                    if is_up && is_org {
                        if let Some(h) = xml::attr(child, "href") {
                            owner = self.transport.org_name(h)?;
                        }
                    }
                }
            }
            if is_published == published {
                return Ok(Some(Catalog {
                    catalog_id,
                    name,
                    published: is_published,
                    owner,
                }));
            }
        }
        Ok(None)
    }

    /// Publishes a captured image into the account's catalog.
    ///
    /// Prefers an account-owned private catalog named "Standard Catalog",
    /// then any account-owned private catalog, then creates the standard one.
    /// Publishing never silently no-ops: with no catalog resolvable by any
    /// path it fails outright.
    pub(crate) fn publish(&self, image: &MachineImage) -> Result<()> {
        let mut chosen: Option<Catalog> = None;
        for catalog in self.list_private_catalogs()?.iter() {
            if catalog.owner == self.scope.account {
                if catalog.name == STANDARD_CATALOG {
                    chosen = Some(catalog.clone());
                    break;
                }
                if chosen.is_none() {
                    chosen = Some(catalog.clone());
                }
            }
        }
        let catalog = match chosen {
            Some(catalog) => catalog,
            None => self.create_standard_catalog(image)?,
        };

        let name = xml::escape(&image.name);
        let mut body = String::new();
        body.push_str(&format!(
            "<CatalogItem xmlns=\"{VCLOUD_NS}\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" name=\"{name}\">"
        ));
        body.push_str(&format!(
            "<Description>{}</Description>",
            xml::escape(&image.description)
        ));
        body.push_str(&format!(
            "<Entity href=\"{}\" name=\"{name}\" type=\"{}\" xsi:type=\"ResourceReferenceType\"/>",
            self.transport.to_url(Resource::VAppTemplate, &image.image_id),
            Resource::VAppTemplate.media_type()
        ));
        body.push_str("</CatalogItem>");

        let url = format!(
            "{}/catalogItems",
            self.transport.to_url(Resource::Catalog, &catalog.catalog_id)
        );
        let response = self.transport.post(
            actions::PUBLISH,
            &url,
            Resource::CatalogItem.media_type(),
            &body,
        )?;
        self.transport.wait_for(&response)
    }

    /// Creates the account's "Standard Catalog" and re-resolves it as an
    /// unpublished catalog.
    fn create_standard_catalog(&self, image: &MachineImage) -> Result<Catalog> {
        let body = format!(
            "<AdminCatalog xmlns=\"{VCLOUD_NS}\" name=\"{}\">\
             <Description>{STANDARD_CATALOG_DESCRIPTION}</Description>\
             <IsPublished>false</IsPublished>\
             </AdminCatalog>",
            xml::escape(STANDARD_CATALOG)
        );
        let url = format!(
            "{}/catalogs",
            self.transport.to_admin_url(Resource::Org, &self.scope.region)
        );
        let response =
            self.transport
                .post(actions::CREATE_CATALOG, &url, media_types::ADMIN_CATALOG, &body)?;
        self.transport.wait_for(&response)?;

        let mut href = None;
        if !response.is_empty() {
            let doc = xml::parse(&response)?;
            for created in xml::descendants_named(&doc, "AdminCatalog") {
                if let Some(h) = xml::attr(created, "href") {
                    href = Some(h.to_string());
                    break;
                }
            }
        }
        let no_catalog = || {
            VcdError::Cloud(format!(
                "No catalog could be identified for publishing vApp template {}",
                image.image_id
            ))
        };
        let href = href.ok_or_else(no_catalog)?;
        self.get_catalog(false, &href)?.ok_or_else(no_catalog)
    }
}
