//! The image-capture state machine.
//!
//! Capture drives a source workload through: wait-for-ready, optional
//! shutdown, the remote capture call with a single conflict-triggered retry,
//! reconciliation of the captured template, and publication. Whatever
//! happens after the shutdown decision, a workload that was running
//! beforehand gets its vApp redeployed at the end.

use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::compute::{UndeployMode, VmState, Workload};
use crate::model::MachineImage;
use crate::transport::{actions, media_types, Resource, OVF_NS, VCLOUD_NS};
use crate::xml;
use crate::TemplateSupport;
use vcd_core::{Result, VcdError};

const READY_DEADLINE: Duration = Duration::from_secs(10 * 60);
const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// The platform's complaint when it still considers the source vApp running.
const STILL_RUNNING_MARKER: &str = "Stop the vApp and try again";

impl TemplateSupport {
    /// Captures a source workload into a new template, publishes it into the
    /// account's catalog, and returns the resulting image record.
    ///
    /// The conflict retry in the middle is the only automatic recovery; every
    /// other failure is fatal. A workload that was running beforehand is
    /// redeployed regardless of how capture ended.
    pub fn capture(
        &self,
        source_vm_id: &str,
        name: &str,
        description: &str,
    ) -> Result<MachineImage> {
        let mut vm = self
            .compute
            .get_workload(source_vm_id)?
            .ok_or_else(|| VcdError::not_found("virtual machine", source_vm_id))?;
        let vapp_id = vm.vapp_id.clone().ok_or_else(|| {
            VcdError::Cloud(format!(
                "Unable to determine the vApp of virtual machine {source_vm_id} for capture"
            ))
        })?;

        let deadline = Instant::now() + READY_DEADLINE;
        while vm.state == VmState::Pending {
            if Instant::now() >= deadline {
                return Err(VcdError::Cloud(format!(
                    "Virtual machine {source_vm_id} stayed in a pending state past the capture deadline"
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
            match self.compute.get_workload(source_vm_id) {
                Ok(Some(current)) => vm = current,
                Ok(None) => {
                    return Err(VcdError::Cloud(format!(
                        "Virtual machine {source_vm_id} went away"
                    )))
                }
                // Transient poll failures do not abort the wait.
                Err(err) => debug!(%err, source_vm_id, "ignoring transient poll failure"),
            }
        }

        let running = vm.state != VmState::Stopped;
        let result = self.capture_and_publish(source_vm_id, &vapp_id, running, &vm, name, description);
        if running {
            if let Err(err) = self.compute.deploy(&vapp_id) {
                warn!(%err, vapp_id, "failed to redeploy source vApp after capture");
                if result.is_ok() {
                    return Err(err);
                }
            }
        }
        result
    }

    fn capture_and_publish(
        &self,
        source_vm_id: &str,
        vapp_id: &str,
        running: bool,
        vm: &Workload,
        name: &str,
        description: &str,
    ) -> Result<MachineImage> {
        // Capture requires the workload not be actively running.
        if running {
            self.compute.undeploy(vapp_id, UndeployMode::Shutdown)?;
        }

        let body = capture_params(
            name,
            description,
            &self.transport.to_url(Resource::VApp, vapp_id),
        );
        let url = format!(
            "{}/action/captureVApp",
            self.transport.to_url(Resource::Vdc, &vm.datacenter_id)
        );
        let mut response = self.transport.post(
            actions::CAPTURE_VAPP,
            &url,
            media_types::CAPTURE_VAPP_PARAMS,
            &body,
        )?;

        if let Err(err) = check_capture_response(&response) {
            match err {
                VcdError::Cloud(message) if message.contains(STILL_RUNNING_MARKER) => {
                    warn!(
                        message,
                        "platform still considers the vApp running; checking what's going on"
                    );
                    let current = self.compute.get_workload(source_vm_id)?.ok_or_else(|| {
                        VcdError::Cloud(format!("Virtual machine {source_vm_id} went away"))
                    })?;
                    if current.state != VmState::Stopped {
                        warn!(state = ?current.state, "forcing shutdown before retrying capture");
                        self.compute.undeploy(vapp_id, UndeployMode::Shutdown)?;
                    }
                    response = self.transport.post(
                        actions::CAPTURE_VAPP,
                        &url,
                        media_types::CAPTURE_VAPP_PARAMS,
                        &body,
                    )?;
                    // A second conflict, or any other error, is fatal.
                    check_capture_response(&response)?;
                }
                other => return Err(other),
            }
        }

        let doc = xml::parse(&response)?;
        let template = xml::first_descendant(&doc, "VAppTemplate").ok_or_else(|| {
            VcdError::Cloud("No vApp template was found in the capture response".to_string())
        })?;
        let image_id = xml::attr(template, "href")
            .map(|href| self.transport.to_id(href))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                VcdError::Cloud("No image identifier was found in the capture response".to_string())
            })?;

        let image = self
            .load_vapp(
                &image_id,
                &self.scope.account,
                false,
                Some(name),
                Some(description),
                Utc::now().timestamp_millis(),
            )?
            .ok_or_else(|| VcdError::Cloud(format!("Captured image {image_id} was lost")))?;

        self.transport.wait_for(&response)?;
        self.publish(&image)?;
        Ok(image)
    }
}

fn capture_params(name: &str, description: &str, source_href: &str) -> String {
    format!(
        "<CaptureVAppParams xmlns=\"{VCLOUD_NS}\" xmlns:ovf=\"{OVF_NS}\" name=\"{}\">\
         <Description>{}</Description>\
         <Source href=\"{source_href}\" type=\"{}\"/>\
         <CustomizationSection><ovf:Info/>\
         <CustomizeOnInstantiate>true</CustomizeOnInstantiate>\
         </CustomizationSection>\
         </CaptureVAppParams>",
        xml::escape(name),
        xml::escape(description),
        Resource::VApp.media_type()
    )
}

/// Parses a capture response and surfaces an encoded platform failure. An
/// empty body carries neither a template nor an error and is itself fatal.
fn check_capture_response(response: &str) -> Result<()> {
    if response.is_empty() {
        return Err(VcdError::Cloud(
            "No error or other information was in the capture response".to_string(),
        ));
    }
    let doc = xml::parse(response)?;
    xml::check_error(&doc)
}
