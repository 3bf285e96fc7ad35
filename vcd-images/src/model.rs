//! Domain records projected from platform documents.
//!
//! Everything here is a read-only projection rebuilt from remote documents on
//! each cache refresh. The only mutation a record ever sees is the stamping
//! of derived attributes (owner, catalog-item id) immediately after
//! construction, before it is handed to a caller.

use std::collections::BTreeMap;

/// The (account, region) scope every cache is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheScope {
    pub account: String,
    pub region: String,
}

impl CacheScope {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        CacheScope {
            account: account.into(),
            region: region.into(),
        }
    }
}

/// A named collection of publishable templates, public or private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub catalog_id: String,
    pub name: String,
    pub published: bool,
    pub owner: String,
}

impl Catalog {
    /// Sentinel owner for catalogs whose document carries no resolvable link
    /// back to an owning organization.
    pub const PUBLIC_OWNER: &'static str = "--public--";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    I32,
    I64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineImageState {
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineImageFormat {
    Vmdk,
}

/// Best-effort classification of an operating system from free-text OS and
/// product strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    CentOs,
    CoreOs,
    Debian,
    Fedora,
    FreeBsd,
    Rhel,
    Suse,
    Ubuntu,
    Windows,
    Unknown,
}

impl Platform {
    /// Guesses a platform from a free-text product or OS description.
    pub fn guess(text: &str) -> Platform {
        let t = text.to_ascii_lowercase();
        if t.contains("windows") {
            Platform::Windows
        } else if t.contains("ubuntu") {
            Platform::Ubuntu
        } else if t.contains("debian") {
            Platform::Debian
        } else if t.contains("centos") || t.contains("cent os") {
            Platform::CentOs
        } else if t.contains("coreos") {
            Platform::CoreOs
        } else if t.contains("fedora") {
            Platform::Fedora
        } else if t.contains("freebsd") {
            Platform::FreeBsd
        } else if t.contains("rhel") || t.contains("red hat") {
            Platform::Rhel
        } else if t.contains("suse") {
            Platform::Suse
        } else {
            Platform::Unknown
        }
    }

    pub fn is_unknown(self) -> bool {
        self == Platform::Unknown
    }
}

/// Default network names derived from a template's primary network
/// connection, split by IP allocation mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkDefaults {
    pub static_default: Option<String>,
    pub dhcp_default: Option<String>,
}

impl NetworkDefaults {
    /// Builds the pair, normalizing blank names to unset.
    pub fn new(static_default: Option<String>, dhcp_default: Option<String>) -> Self {
        fn non_empty(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        NetworkDefaults {
            static_default: non_empty(static_default),
            dhcp_default: non_empty(dhcp_default),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.static_default.is_none() && self.dhcp_default.is_none()
    }
}

/// Well-known auxiliary attribute keys stamped onto images.
pub mod attrs {
    pub const CATALOG_ITEM_ID: &str = "catalogItemId";
    pub const PUBLIC: &str = "public";
    pub const DEFAULT_VLAN_NAME: &str = "defaultVlanName";
    pub const DEFAULT_VLAN_NAME_DHCP: &str = "defaultVlanNameDHCP";
    pub const PARENT_NETWORK_HREF: &str = "parentNetworkHref";
    pub const PARENT_NETWORK_ID: &str = "parentNetworkId";
    pub const PARENT_NETWORK_NAME: &str = "parentNetworkName";
    pub const FULL_NET_CONF: &str = "fullNetConf";
}

/// A captured template projected as a generic machine image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineImage {
    pub image_id: String,
    pub owner: String,
    pub region: String,
    pub state: MachineImageState,
    pub name: String,
    pub description: String,
    pub architecture: Architecture,
    pub platform: Platform,
    /// Epoch milliseconds; zero when the platform reported no creation time.
    pub created_at: i64,
    /// Child workload identifiers, lexicographically sorted, deduplicated.
    pub child_vm_ids: Vec<String>,
    attributes: BTreeMap<String, String>,
}

impl MachineImage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: impl Into<String>,
        region: impl Into<String>,
        image_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        architecture: Architecture,
        platform: Platform,
    ) -> Self {
        MachineImage {
            image_id: image_id.into(),
            owner: owner.into(),
            region: region.into(),
            state: MachineImageState::Active,
            name: name.into(),
            description: description.into(),
            architecture,
            platform,
            created_at: 0,
            child_vm_ids: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn set_attribute(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// True when the image came from a published catalog.
    pub fn is_public(&self) -> bool {
        self.attribute(attrs::PUBLIC) == Some("true")
    }
}

/// Predicate applied while accumulating a listing.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    /// Substring match against the image name.
    pub name: Option<String>,
    pub platform: Option<Platform>,
    pub owner: Option<String>,
}

impl ImageFilter {
    pub fn matches(&self, image: &MachineImage) -> bool {
        if let Some(name) = &self.name {
            if !image.name.contains(name.as_str()) {
                return false;
            }
        }
        if let Some(platform) = self.platform {
            if image.platform != platform {
                return false;
            }
        }
        if let Some(owner) = &self.owner {
            if &image.owner != owner {
                return false;
            }
        }
        true
    }
}

/// Parses a platform timestamp into epoch milliseconds, zero if unparseable.
pub fn parse_time(text: &str) -> i64 {
    let text = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis();
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc().timestamp_millis();
    }
    0
}
