//! Resolving catalog items into fully-populated machine images.
//!
//! A catalog item is a thin binding: name, description, creation time, and an
//! entity link pointing at the underlying vApp template. The template
//! document itself carries the child workloads, OS and product metadata, the
//! network sections, and the storage lease. Missing optional sections always
//! default; only a missing or unlocatable root element makes a load come back
//! empty. A dangling catalog entry is a valid, if incomplete, state.

use std::collections::BTreeSet;

use chrono::Utc;
use roxmltree::{Document, Node};
use tracing::{trace, warn};

use crate::model::{attrs, parse_time, Architecture, MachineImage, NetworkDefaults, Platform};
use crate::transport::Resource;
use crate::xml;
use crate::TemplateSupport;
use vcd_core::Result;

impl TemplateSupport {
    /// Resolves a catalog-item reference into an image record.
    ///
    /// Returns `Ok(None)` for a missing item document, a missing entity link,
    /// or an expired template; none of those are errors.
    pub(crate) fn load_template(
        &self,
        owner: &str,
        catalog_item_id: &str,
        published: bool,
    ) -> Result<Option<MachineImage>> {
        let Some(body) = self.transport.get(Resource::CatalogItem, catalog_item_id)? else {
            warn!(catalog_item_id, "catalog item is missing from the catalog");
            return Ok(None);
        };
        let doc = xml::parse(&body)?;
        let Some(item) = xml::first_descendant(&doc, "CatalogItem") else {
            return Ok(None);
        };

        let mut name = xml::attr(item, "name").map(str::to_string);
        let mut description = name.clone();
        let mut created_at = 0i64;
        let mut template_id = None;

        for entry in item.children().filter(Node::is_element) {
            if xml::name_is(entry, "Description") {
                if let Some(d) = xml::text(entry) {
                    description = Some(d.to_string());
                    if name.is_none() {
                        name = Some(d.to_string());
                    }
                }
            } else if xml::name_is(entry, "DateCreated") {
                if let Some(t) = xml::text(entry) {
                    created_at = parse_time(t);
                }
            } else if xml::name_is(entry, "Entity") {
                if let Some(href) = xml::attr(entry, "href") {
                    template_id = Some(self.transport.to_id(href));
                }
            }
        }

        match template_id {
            Some(id) => self.load_vapp(
                &id,
                owner,
                published,
                name.as_deref(),
                description.as_deref(),
                created_at,
            ),
            None => Ok(None),
        }
    }

    /// Loads a vApp template document into an image record.
    ///
    /// `name`, `description`, and `created_at` are fallbacks supplied by the
    /// caller (from the catalog item, or from a capture request); values found
    /// in the template document take their documented precedence over them.
    pub(crate) fn load_vapp(
        &self,
        image_id: &str,
        owner: &str,
        published: bool,
        name: Option<&str>,
        description: Option<&str>,
        created_at: i64,
    ) -> Result<Option<MachineImage>> {
        let Some(body) = self.transport.get(Resource::VAppTemplate, image_id)? else {
            return Ok(None);
        };
        let doc = xml::parse(&body)?;
        let Some(template) = xml::first_descendant(&doc, "VAppTemplate") else {
            return Ok(None);
        };

        let mut acc = VappAccumulator::new(name, description, created_at);
        if acc.name.is_none() {
            acc.name = xml::attr(template, "name").map(str::to_string);
        }

        let now = Utc::now().timestamp_millis();
        for section in template.children().filter(Node::is_element) {
            if xml::name_is(section, "Description") {
                if acc.description.is_none() {
                    if let Some(d) = xml::text(section) {
                        acc.description = Some(d.to_string());
                        if acc.name.is_none() {
                            acc.name = Some(d.to_string());
                        }
                    }
                }
            } else if xml::name_is(section, "NetworkConfigSection") {
                scan_network_config(&doc, section, &mut acc);
            } else if xml::name_is(section, "Children") {
                self.scan_children(section, &mut acc);
            } else if xml::name_is(section, "DateCreated") {
                if let Some(t) = xml::text(section) {
                    acc.created_at = parse_time(t);
                }
            } else if xml::name_is(section, "LeaseSettingsSection") && lease_expired(section, now) {
                trace!(image_id, "vApp template has an expired storage lease");
                return Ok(None);
            }
        }

        Ok(Some(acc.finish(image_id, owner, &self.scope.region, published)))
    }

    /// Walks the template's child workloads, collecting their identifiers and
    /// the name/platform/architecture/network metadata they carry.
    fn scan_children(&self, children: Node<'_, '_>, acc: &mut VappAccumulator) {
        for vm in xml::children_named(children, "Vm") {
            if let Some(href) = xml::attr(vm, "href") {
                acc.child_vm_ids.insert(self.transport.to_id(href));
            }
            for vm_attr in vm.children().filter(Node::is_element) {
                if xml::name_is(vm_attr, "GuestCustomizationSection") {
                    for cust in xml::children_named(vm_attr, "ComputerName") {
                        if let Some(n) = xml::text(cust) {
                            acc.name = Some(match acc.name.take() {
                                Some(existing) => format!("{existing} - {n}"),
                                None => n.to_string(),
                            });
                        }
                    }
                } else if xml::name_is(vm_attr, "ProductSection") {
                    for product in xml::children_named(vm_attr, "Product") {
                        if let Some(text) = xml::text(product) {
                            acc.note_platform_source(text);
                        }
                    }
                } else if xml::name_is(vm_attr, "OperatingSystemSection") {
                    for os_desc in xml::children_named(vm_attr, "Description") {
                        if let Some(text) = xml::text(os_desc) {
                            acc.note_platform_source(text);
                            if architecture_from_os(text) == Architecture::I32 {
                                acc.architecture = Architecture::I32;
                            }
                        }
                    }
                } else if xml::name_is(vm_attr, "NetworkConnectionSection")
                    && acc.network_defaults.is_none()
                {
                    acc.network_defaults = Some(network_defaults(vm_attr));
                }
            }
        }
    }
}

/// Accumulates the pieces of an image record as the template document is
/// walked, and merges them at the end; partial construction never leaks.
#[derive(Debug)]
struct VappAccumulator {
    name: Option<String>,
    description: Option<String>,
    platform_source: Option<String>,
    architecture: Architecture,
    created_at: i64,
    child_vm_ids: BTreeSet<String>,
    network_defaults: Option<NetworkDefaults>,
    parent_network_href: Option<String>,
    parent_network_id: Option<String>,
    parent_network_name: Option<String>,
    raw_net_config: Option<String>,
}

impl VappAccumulator {
    fn new(name: Option<&str>, description: Option<&str>, created_at: i64) -> Self {
        VappAccumulator {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
            platform_source: None,
            architecture: Architecture::I64,
            created_at,
            child_vm_ids: BTreeSet::new(),
            network_defaults: None,
            parent_network_href: None,
            parent_network_id: None,
            parent_network_name: None,
            raw_net_config: None,
        }
    }

    /// Remembers the first non-empty product/OS string for platform guessing.
    fn note_platform_source(&mut self, text: &str) {
        if self.platform_source.is_none() {
            self.platform_source = Some(text.to_string());
        }
    }

    fn finish(self, image_id: &str, owner: &str, region: &str, published: bool) -> MachineImage {
        let name = self.name.unwrap_or_else(|| image_id.to_string());
        let description = self.description.unwrap_or_else(|| name.clone());
        let mut platform = self
            .platform_source
            .as_deref()
            .map(Platform::guess)
            .unwrap_or(Platform::Unknown);
        if platform.is_unknown() {
            platform = Platform::guess(&format!("{name} {description}"));
        }

        let mut image = MachineImage::new(
            owner,
            region,
            image_id,
            name,
            description,
            self.architecture,
            platform,
        );
        image.created_at = self.created_at;
        image.child_vm_ids = self.child_vm_ids.into_iter().collect();

        if published {
            image.set_attribute(attrs::PUBLIC, "true");
        }
        if let Some(defaults) = self.network_defaults {
            if let Some(name) = defaults.static_default {
                image.set_attribute(attrs::DEFAULT_VLAN_NAME, name);
            }
            if let Some(name) = defaults.dhcp_default {
                image.set_attribute(attrs::DEFAULT_VLAN_NAME_DHCP, name);
            }
        }
        if let Some(href) = self.parent_network_href {
            image.set_attribute(attrs::PARENT_NETWORK_HREF, href);
        }
        if let Some(id) = self.parent_network_id {
            image.set_attribute(attrs::PARENT_NETWORK_ID, id);
        }
        if let Some(name) = self.parent_network_name {
            image.set_attribute(attrs::PARENT_NETWORK_NAME, name);
        }
        if let Some(conf) = self.raw_net_config {
            image.set_attribute(attrs::FULL_NET_CONF, conf);
        }
        image
    }
}

/// Captures the raw network-config fragment and the parent-network reference.
fn scan_network_config(doc: &Document<'_>, section: Node<'_, '_>, acc: &mut VappAccumulator) {
    for config in xml::children_named(section, "NetworkConfig") {
        acc.raw_net_config = Some(xml::raw_fragment(doc, config).to_string());
        for configuration in xml::children_named(config, "Configuration") {
            for parent in xml::children_named(configuration, "ParentNetwork") {
                if let Some(href) = xml::attr(parent, "href") {
                    acc.parent_network_href = Some(href.to_string());
                }
                if let Some(id) = xml::attr(parent, "id") {
                    acc.parent_network_id = Some(id.to_string());
                }
                if let Some(name) = xml::attr(parent, "name") {
                    acc.parent_network_name = Some(name.to_string());
                }
            }
        }
    }
}

/// Classifies the primary network connection of a connection section.
///
/// Only the connection whose index matches `PrimaryNetworkConnectionIndex`
/// counts; its `network` attribute becomes the DHCP default when its
/// allocation mode is DHCP, the static default otherwise. Every other
/// connection is ignored.
fn network_defaults(section: Node<'_, '_>) -> NetworkDefaults {
    let primary = xml::first_child_named(section, "PrimaryNetworkConnectionIndex")
        .and_then(xml::text)
        .and_then(|t| t.parse::<i32>().ok());
    let Some(primary) = primary else {
        return NetworkDefaults::default();
    };

    let mut static_default = None;
    let mut dhcp_default = None;
    for connection in xml::children_named(section, "NetworkConnection") {
        let index = xml::first_child_named(connection, "NetworkConnectionIndex")
            .and_then(xml::text)
            .and_then(|t| t.parse::<i32>().ok());
        if index != Some(primary) {
            continue;
        }
        let Some(network_name) = xml::attr(connection, "network") else {
            continue;
        };
        for mode in xml::children_named(connection, "IpAddressAllocationMode") {
            if xml::text(mode).is_some_and(|t| t.eq_ignore_ascii_case("DHCP")) {
                dhcp_default = Some(network_name.to_string());
            } else {
                static_default = Some(network_name.to_string());
            }
        }
    }
    NetworkDefaults::new(static_default, dhcp_default)
}

/// Architecture defaults to 64-bit; an OS description downgrades it only
/// when it names a 32-bit target.
fn architecture_from_os(desc: &str) -> Architecture {
    if desc.contains("32") || (desc.contains("x86") && !desc.contains("64")) {
        Architecture::I32
    } else {
        Architecture::I64
    }
}

/// True when the section's storage lease expired before `now_ms` (UTC epoch
/// milliseconds). Expired templates are invisible, not merely flagged.
fn lease_expired(section: Node<'_, '_>, now_ms: i64) -> bool {
    for child in xml::children_named(section, "StorageLeaseExpiration") {
        if let Some(text) = xml::text(child) {
            let expiry = parse_time(text);
            if expiry > 0 && now_ms > expiry {
                return true;
            }
        }
    }
    false
}
