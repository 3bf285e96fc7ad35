#![allow(dead_code)]

//! In-memory transport and compute doubles for driving the public surface.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vcd_images::compute::{ComputeServices, UndeployMode, VmState, Workload};
use vcd_images::model::CacheScope;
use vcd_images::transport::{actions, Resource, Transport};
use vcd_images::{TemplateSupport, VcdError, VcdResult};

pub const BASE: &str = "https://vcd.example.com/api";
pub const ACCOUNT: &str = "acme";
pub const REGION: &str = "region-1";

/// Ordered record of the externally visible actions a test provoked.
pub type Events = Arc<Mutex<Vec<String>>>;

pub struct MockTransport {
    docs: Mutex<HashMap<(Resource, String), String>>,
    get_counts: Mutex<HashMap<(Resource, String), usize>>,
    get_latency: Mutex<Option<Duration>>,
    post_log: Mutex<Vec<(String, String, String)>>,
    post_responses: Mutex<HashMap<String, VecDeque<String>>>,
    post_inserts: Mutex<HashMap<String, Vec<((Resource, String), String)>>>,
    publish_error: Mutex<Option<String>>,
    pub deletes: Mutex<Vec<(Resource, String)>>,
    events: Events,
}

impl MockTransport {
    pub fn new(events: Events) -> Self {
        MockTransport {
            docs: Mutex::new(HashMap::new()),
            get_counts: Mutex::new(HashMap::new()),
            get_latency: Mutex::new(None),
            post_log: Mutex::new(Vec::new()),
            post_responses: Mutex::new(HashMap::new()),
            post_inserts: Mutex::new(HashMap::new()),
            publish_error: Mutex::new(None),
            deletes: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn insert_doc(&self, resource: Resource, id: &str, doc: String) {
        self.docs
            .lock()
            .unwrap()
            .insert((resource, id.to_string()), doc);
    }

    /// Queues a scripted response body for an action; unscripted actions get
    /// a generic successful task document.
    pub fn script_response(&self, action: &str, body: String) {
        self.post_responses
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push_back(body);
    }

    /// Registers a document that becomes visible once `action` is posted,
    /// simulating the platform-side effect of the request.
    pub fn script_insert(&self, action: &str, resource: Resource, id: &str, doc: String) {
        self.post_inserts
            .lock()
            .unwrap()
            .entry(action.to_string())
            .or_default()
            .push(((resource, id.to_string()), doc));
    }

    pub fn set_publish_error(&self, message: &str) {
        *self.publish_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_get_latency(&self, latency: Duration) {
        *self.get_latency.lock().unwrap() = Some(latency);
    }

    pub fn get_count(&self, resource: Resource, id: &str) -> usize {
        self.get_counts
            .lock()
            .unwrap()
            .get(&(resource, id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn posts_for(&self, action: &str) -> Vec<(String, String, String)> {
        self.post_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _, _)| a == action)
            .cloned()
            .collect()
    }

    fn wire_name(resource: Resource) -> &'static str {
        match resource {
            Resource::Org => "org",
            Resource::Vdc => "vdc",
            Resource::VApp => "vApp",
            Resource::VAppTemplate => "vAppTemplate",
            Resource::Catalog => "catalog",
            Resource::CatalogItem => "catalogItem",
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, resource: Resource, id: &str) -> VcdResult<Option<String>> {
        *self
            .get_counts
            .lock()
            .unwrap()
            .entry((resource, id.to_string()))
            .or_insert(0) += 1;
        let latency = *self.get_latency.lock().unwrap();
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        Ok(self.docs.lock().unwrap().get(&(resource, id.to_string())).cloned())
    }

    fn post(&self, action: &str, url: &str, _media_type: &str, body: &str) -> VcdResult<String> {
        self.events.lock().unwrap().push(format!("post:{action}"));
        self.post_log
            .lock()
            .unwrap()
            .push((action.to_string(), url.to_string(), body.to_string()));

        if action == actions::PUBLISH {
            if let Some(message) = self.publish_error.lock().unwrap().clone() {
                return Err(VcdError::Cloud(message));
            }
        }
        if let Some(docs) = self.post_inserts.lock().unwrap().remove(action) {
            let mut map = self.docs.lock().unwrap();
            for (key, doc) in docs {
                map.insert(key, doc);
            }
        }
        if let Some(queue) = self.post_responses.lock().unwrap().get_mut(action) {
            if let Some(response) = queue.pop_front() {
                return Ok(response);
            }
        }
        Ok(task_doc())
    }

    fn delete(&self, resource: Resource, id: &str) -> VcdResult<()> {
        self.deletes.lock().unwrap().push((resource, id.to_string()));
        Ok(())
    }

    fn wait_for(&self, _response: &str) -> VcdResult<()> {
        Ok(())
    }

    fn to_url(&self, resource: Resource, id: &str) -> String {
        format!("{BASE}/{}/{id}", Self::wire_name(resource))
    }

    fn to_admin_url(&self, resource: Resource, id: &str) -> String {
        format!("{BASE}/admin/{}/{id}", Self::wire_name(resource))
    }

    fn to_id(&self, href: &str) -> String {
        href.rsplit('/').next().unwrap_or(href).to_string()
    }

    fn org_name(&self, href: &str) -> VcdResult<String> {
        Ok(self.to_id(href))
    }
}

pub struct MockCompute {
    workloads: Mutex<HashMap<String, Workload>>,
    pub undeploys: Mutex<Vec<(String, UndeployMode)>>,
    pub deploys: Mutex<Vec<String>>,
    /// When set, an undeploy flips every workload in the vApp to `Stopped`.
    pub stop_on_undeploy: bool,
    events: Events,
}

impl MockCompute {
    pub fn new(events: Events) -> Self {
        MockCompute {
            workloads: Mutex::new(HashMap::new()),
            undeploys: Mutex::new(Vec::new()),
            deploys: Mutex::new(Vec::new()),
            stop_on_undeploy: true,
            events,
        }
    }

    pub fn insert_workload(&self, workload: Workload) {
        self.workloads
            .lock()
            .unwrap()
            .insert(workload.workload_id.clone(), workload);
    }
}

impl ComputeServices for MockCompute {
    fn get_workload(&self, id: &str) -> VcdResult<Option<Workload>> {
        Ok(self.workloads.lock().unwrap().get(id).cloned())
    }

    fn undeploy(&self, vapp_id: &str, mode: UndeployMode) -> VcdResult<()> {
        self.events.lock().unwrap().push("undeploy".to_string());
        self.undeploys
            .lock()
            .unwrap()
            .push((vapp_id.to_string(), mode));
        if self.stop_on_undeploy {
            for workload in self.workloads.lock().unwrap().values_mut() {
                if workload.vapp_id.as_deref() == Some(vapp_id) {
                    workload.state = VmState::Stopped;
                }
            }
        }
        Ok(())
    }

    fn deploy(&self, vapp_id: &str) -> VcdResult<()> {
        self.events.lock().unwrap().push("deploy".to_string());
        self.deploys.lock().unwrap().push(vapp_id.to_string());
        Ok(())
    }
}

pub struct Env {
    pub support: TemplateSupport,
    pub transport: Arc<MockTransport>,
    pub compute: Arc<MockCompute>,
    pub events: Events,
}

impl Env {
    pub fn recorded_events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

pub fn env() -> Env {
    env_with(|_| {})
}

pub fn env_with(configure: impl FnOnce(&mut MockCompute)) -> Env {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(MockTransport::new(events.clone()));
    let mut compute = MockCompute::new(events.clone());
    configure(&mut compute);
    let compute = Arc::new(compute);
    let support = TemplateSupport::new(
        CacheScope::new(ACCOUNT, REGION),
        transport.clone() as Arc<dyn Transport>,
        compute.clone() as Arc<dyn ComputeServices>,
    );
    Env {
        support,
        transport,
        compute,
        events,
    }
}

// ---------------------------------------------------------------------------
// Document fixtures. Every builder takes a namespace style so the same
// logical document can be rendered with or without an element prefix.
// ---------------------------------------------------------------------------

pub struct Ns {
    pub prefix: &'static str,
    pub decl: &'static str,
}

pub const PLAIN: Ns = Ns {
    prefix: "",
    decl: "xmlns=\"http://www.vmware.com/vcloud/v1.5\"",
};

pub const PREFIXED: Ns = Ns {
    prefix: "vcloud:",
    decl: "xmlns:vcloud=\"http://www.vmware.com/vcloud/v1.5\"",
};

pub fn task_doc() -> String {
    format!("<Task {} status=\"success\" href=\"{BASE}/task/task-1\"/>", PLAIN.decl)
}

pub fn error_doc(message: &str) -> String {
    format!(
        "<Error {} message=\"{message}\" majorErrorCode=\"400\" minorErrorCode=\"BAD_REQUEST\"/>",
        PLAIN.decl
    )
}

pub fn org_doc(ns: &Ns, catalog_ids: &[&str]) -> String {
    let p = ns.prefix;
    let mut links = String::new();
    for id in catalog_ids {
        links.push_str(&format!(
            "<{p}Link rel=\"down\" type=\"{}\" href=\"{BASE}/catalog/{id}\"/>",
            Resource::Catalog.media_type()
        ));
    }
    // An unrelated link the scan must skip over.
    links.push_str(&format!(
        "<{p}Link rel=\"down\" type=\"{}\" href=\"{BASE}/vdc/vdc-1\"/>",
        Resource::Vdc.media_type()
    ));
    format!("<{p}Org {} name=\"{ACCOUNT}\">{links}</{p}Org>", ns.decl)
}

pub fn catalog_doc(
    ns: &Ns,
    name: &str,
    published: bool,
    owner_org: Option<&str>,
    item_ids: &[&str],
) -> String {
    let p = ns.prefix;
    let up = owner_org
        .map(|org| {
            format!(
                "<{p}Link rel=\"up\" type=\"{}\" href=\"{BASE}/org/{org}\"/>",
                Resource::Org.media_type()
            )
        })
        .unwrap_or_default();
    let mut items = String::new();
    for id in item_ids {
        items.push_str(&format!(
            "<{p}CatalogItem href=\"{BASE}/catalogItem/{id}\" name=\"{id}\"/>"
        ));
    }
    format!(
        "<{p}Catalog {} name=\"{name}\">\
         <{p}IsPublished>{published}</{p}IsPublished>{up}\
         <{p}CatalogItems>{items}</{p}CatalogItems>\
         </{p}Catalog>",
        ns.decl
    )
}

pub fn catalog_item_doc(ns: &Ns, id: &str, name: &str, description: &str, entity_id: &str) -> String {
    let p = ns.prefix;
    format!(
        "<{p}CatalogItem {} name=\"{name}\" href=\"{BASE}/catalogItem/{id}\">\
         <{p}Description>{description}</{p}Description>\
         <{p}DateCreated>2024-05-01T12:00:00.000Z</{p}DateCreated>\
         <{p}Entity href=\"{BASE}/vAppTemplate/{entity_id}\" type=\"{}\"/>\
         </{p}CatalogItem>",
        ns.decl,
        Resource::VAppTemplate.media_type()
    )
}

pub struct TemplateFixture<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub lease_expiration: Option<&'a str>,
    pub with_children: bool,
}

impl Default for TemplateFixture<'_> {
    fn default() -> Self {
        TemplateFixture {
            id: "vappTemplate-1",
            name: "ubuntu-tpl",
            lease_expiration: Some("2999-01-01T00:00:00.000Z"),
            with_children: true,
        }
    }
}

pub fn vapp_template_doc(ns: &Ns, fixture: &TemplateFixture<'_>) -> String {
    let p = ns.prefix;
    let lease = fixture
        .lease_expiration
        .map(|expiry| {
            format!(
                "<{p}LeaseSettingsSection>\
                 <{p}StorageLeaseExpiration>{expiry}</{p}StorageLeaseExpiration>\
                 </{p}LeaseSettingsSection>"
            )
        })
        .unwrap_or_default();
    let children = if fixture.with_children {
        format!(
            "<{p}Children>\
             <{p}Vm href=\"{BASE}/vm/vm-child-1\">\
             <{p}ProductSection><{p}Product>Ubuntu Linux</{p}Product></{p}ProductSection>\
             <{p}OperatingSystemSection>\
             <{p}Description>Ubuntu Linux (64-bit)</{p}Description>\
             </{p}OperatingSystemSection>\
             <{p}NetworkConnectionSection>\
             <{p}PrimaryNetworkConnectionIndex>1</{p}PrimaryNetworkConnectionIndex>\
             <{p}NetworkConnection network=\"net-a\">\
             <{p}NetworkConnectionIndex>0</{p}NetworkConnectionIndex>\
             <{p}IpAddressAllocationMode>MANUAL</{p}IpAddressAllocationMode>\
             </{p}NetworkConnection>\
             <{p}NetworkConnection network=\"net-b\">\
             <{p}NetworkConnectionIndex>1</{p}NetworkConnectionIndex>\
             <{p}IpAddressAllocationMode>DHCP</{p}IpAddressAllocationMode>\
             </{p}NetworkConnection>\
             </{p}NetworkConnectionSection>\
             </{p}Vm>\
             </{p}Children>"
        )
    } else {
        String::new()
    };
    format!(
        "<{p}VAppTemplate {} name=\"{}\" href=\"{BASE}/vAppTemplate/{}\">\
         <{p}Description>Ubuntu 22.04</{p}Description>\
         {lease}\
         <{p}NetworkConfigSection>\
         <{p}NetworkConfig networkName=\"net-b\">\
         <{p}Configuration>\
         <{p}ParentNetwork href=\"{BASE}/network/net-9\" id=\"net-9\" name=\"shared-net\"/>\
         </{p}Configuration>\
         </{p}NetworkConfig>\
         </{p}NetworkConfigSection>\
         {children}\
         </{p}VAppTemplate>",
        ns.decl, fixture.name, fixture.id
    )
}

/// Installs the standard environment: one private account-owned catalog
/// holding one Ubuntu template, and one ownerless published catalog holding
/// another.
pub fn seed_standard_docs(transport: &MockTransport, ns: &Ns) {
    transport.insert_doc(Resource::Org, REGION, org_doc(ns, &["cat-1", "cat-pub"]));
    transport.insert_doc(
        Resource::Catalog,
        "cat-1",
        catalog_doc(ns, "Standard Catalog", false, Some(ACCOUNT), &["ci-1"]),
    );
    transport.insert_doc(
        Resource::Catalog,
        "cat-pub",
        catalog_doc(ns, "Public Catalog", true, None, &["ci-pub"]),
    );
    transport.insert_doc(
        Resource::CatalogItem,
        "ci-1",
        catalog_item_doc(ns, "ci-1", "ubuntu-image", "Ubuntu 22.04 template", "vappTemplate-1"),
    );
    transport.insert_doc(
        Resource::CatalogItem,
        "ci-pub",
        catalog_item_doc(ns, "ci-pub", "public-image", "Shared base image", "vappTemplate-pub"),
    );
    transport.insert_doc(
        Resource::VAppTemplate,
        "vappTemplate-1",
        vapp_template_doc(ns, &TemplateFixture::default()),
    );
    transport.insert_doc(
        Resource::VAppTemplate,
        "vappTemplate-pub",
        vapp_template_doc(
            ns,
            &TemplateFixture {
                id: "vappTemplate-pub",
                name: "public-tpl",
                ..Default::default()
            },
        ),
    );
}
