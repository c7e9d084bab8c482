// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! The coordinator [`Controller`] and its components.

pub mod admission;
pub mod dispatcher;
pub mod endpoints;
pub mod events;
pub mod network;
pub mod reset;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use zcoord_app::ConfigFile;

use crate::config::ControllerConfig;
use crate::device::{
    BindTarget, BindingKind, DeviceAnnounce, DeviceDirectory, DeviceInfo, DeviceRef, DeviceStatus,
    EndpointRef, IeeeAddr, RemoveOptions,
};
use crate::endpoint::LocalEndpoint;
use crate::error::{ControllerError, ControllerResult, TransportError};
use crate::nv::{NvConfig, NvParams};
use crate::subsystem::{Ident, Subsystem};
use crate::transport::{Indication, Transport, TransportEvent, ZdoCodec};

pub use admission::{AdmissionState, JoinAdmissionController, Submission};
pub use dispatcher::{RequestDispatcher, TransactionCounter};
pub use endpoints::EndpointRegistry;
pub use events::{ControllerEventEmitter, ControllerListener, JoinPhase, ListenerId};
pub use network::{JoinScope, NetState, NetworkInfo, NetworkStateManager};
pub use reset::{ResetMode, ResetSequencer};

/// Link state as last reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Closed,
    Ready,
}

/// Coordinator control plane.
///
/// Owns the request dispatcher and every component built on it. Transport
/// events reach the controller through [`Controller::spawn_event_loop`] (or
/// [`Controller::handle_event`] directly).
pub struct Controller {
    dispatcher: Arc<RequestDispatcher>,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn DeviceDirectory>,
    emitter: Arc<ControllerEventEmitter>,
    network: NetworkStateManager,
    admission: Arc<JoinAdmissionController>,
    resetter: ResetSequencer,
    endpoints: EndpointRegistry,
    link: watch::Sender<LinkState>,
    check_online_timeout: Duration,
}

impl Controller {
    pub fn new(
        config: &ControllerConfig,
        transport: Arc<dyn Transport>,
        zdo: Arc<dyn ZdoCodec>,
        directory: Arc<dyn DeviceDirectory>,
    ) -> ControllerResult<Arc<Self>> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(ControllerError::invalid(errors.join("; ")));
        }

        let timing = &config.timing;
        let dispatcher = Arc::new(RequestDispatcher::new(Arc::clone(&transport), zdo));
        let emitter = Arc::new(ControllerEventEmitter::new());
        let resetter = ResetSequencer::new(
            Arc::clone(&dispatcher),
            timing.nv_step_delay(),
            timing.reset_timeout(),
        );
        resetter.apply_nv_params(&config.net)?;

        let (link, _) = watch::channel(LinkState::Closed);
        Ok(Arc::new(Self {
            network: NetworkStateManager::new(timing.permit_join_tick()),
            admission: Arc::new(JoinAdmissionController::new(
                Arc::clone(&directory),
                Arc::clone(&emitter),
                timing.join_timeout(),
            )),
            endpoints: EndpointRegistry::new(Arc::clone(&dispatcher)),
            resetter,
            dispatcher,
            transport,
            directory,
            emitter,
            link,
            check_online_timeout: timing.check_online_timeout(),
        }))
    }

    pub fn register_listener(&self, listener: Arc<dyn ControllerListener>) -> ListenerId {
        self.emitter.register(listener)
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        self.emitter.unregister(id);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the transport and wait for it to report ready.
    ///
    /// Needs the event loop running to observe the ready event.
    pub async fn start(&self) -> ControllerResult<()> {
        let mut rx = self.link.subscribe();
        self.transport.open().await?;
        rx.wait_for(|state| *state == LinkState::Ready)
            .await
            .map_err(|_| TransportError::Closed)?;
        info!("Coordinator link ready");
        Ok(())
    }

    /// Close the transport and wait for it to report closed.
    pub async fn close(&self) -> ControllerResult<()> {
        let mut rx = self.link.subscribe();
        self.transport.close().await?;
        rx.wait_for(|state| *state == LinkState::Closed)
            .await
            .map_err(|_| TransportError::Closed)?;
        info!("Coordinator link closed");
        Ok(())
    }

    /// Pump transport events into the controller until the channel closes.
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_event(event);
            }
            debug!("Transport event channel closed");
        })
    }

    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Ready => {
                self.link.send_replace(LinkState::Ready);
                self.emitter.notify_network_ready();
            }
            TransportEvent::Closed => {
                self.link.send_replace(LinkState::Closed);
                self.emitter.notify_network_closed();
            }
            TransportEvent::Unsolicited(Indication::DeviceAnnounce(announce)) => {
                self.admission.submit(announce);
            }
            TransportEvent::Unsolicited(indication) => {
                if let Indication::ResetInd { reason } = &indication {
                    debug!("Reset indication (reason {})", reason);
                    self.resetter.reset_indicated();
                }
                self.emitter.notify_indication(&indication);
            }
        }
    }

    // ========================================================================
    // Requests
    // ========================================================================

    pub async fn request(
        &self,
        subsystem: impl Into<Ident>,
        command: impl Into<Ident>,
        args: Value,
    ) -> ControllerResult<Value> {
        self.dispatcher.request(subsystem, command, args).await
    }

    pub async fn request_json(
        &self,
        subsystem: &Value,
        command: &Value,
        args: Value,
    ) -> ControllerResult<Value> {
        self.dispatcher.request_json(subsystem, command, args).await
    }

    pub fn next_trans_id(&self) -> u8 {
        self.dispatcher.next_trans_id()
    }

    // ========================================================================
    // Network
    // ========================================================================

    pub fn get_net_info(&self) -> NetworkInfo {
        self.network.net_info()
    }

    pub fn set_net_info(&self, partial: &Value) -> ControllerResult<()> {
        self.network.set_net_info(partial)
    }

    pub async fn permit_join(&self, seconds: u8, scope: JoinScope) -> ControllerResult<Value> {
        self.network
            .permit_join(&self.dispatcher, &self.emitter, seconds, scope)
            .await
    }

    pub fn is_permit_join_ticking(&self) -> bool {
        self.network.is_ticking()
    }

    /// Ask `device` to leave the network.
    pub async fn remove(&self, device: &DeviceRef, options: RemoveOptions) -> ControllerResult<Value> {
        let rsp = self
            .dispatcher
            .dispatch(
                Subsystem::Zdo,
                "mgmtLeaveReq",
                json!({
                    "dstaddr": device.nwk_addr,
                    "deviceaddress": device.ieee_addr.to_string(),
                    "removechildren_rejoin": options.flags(),
                }),
            )
            .await?;
        dispatcher::check_zdo_status(&rsp)?;
        info!("Device {} asked to leave", device.ieee_addr);
        Ok(rsp)
    }

    // ========================================================================
    // Reset and NV
    // ========================================================================

    pub async fn reset(&self, mode: ResetMode) -> ControllerResult<()> {
        self.resetter.reset(mode).await
    }

    pub fn is_resetting(&self) -> bool {
        self.resetter.is_resetting()
    }

    pub fn is_config_dirty(&self) -> bool {
        self.resetter.is_config_dirty()
    }

    pub fn nv_config(&self) -> NvConfig {
        self.resetter.nv_config()
    }

    /// Apply a partial NV update. Takes effect on the next hard reset.
    pub fn set_nv_params(&self, params: &Value) -> ControllerResult<()> {
        let params = NvParams::from_json(params)?;
        self.resetter.apply_nv_params(&params)
    }

    pub async fn check_nv_params(&self) -> ControllerResult<()> {
        self.resetter.check_nv_params().await
    }

    // ========================================================================
    // Endpoints
    // ========================================================================

    pub async fn register_ep(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        self.endpoints.register_ep(ep).await
    }

    pub async fn deregister_ep(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        self.endpoints.deregister_ep(ep).await
    }

    pub async fn re_register_ep(&self, ep: &LocalEndpoint) -> ControllerResult<Value> {
        self.endpoints.re_register_ep(ep).await
    }

    pub fn endpoints(&self) -> Vec<LocalEndpoint> {
        self.endpoints.endpoints()
    }

    // ========================================================================
    // Devices
    // ========================================================================

    pub fn submit_announce(&self, announce: DeviceAnnounce) -> Submission {
        self.admission.submit(announce)
    }

    pub fn admission_state(&self) -> AdmissionState {
        self.admission.state()
    }

    pub fn admission_backlog(&self) -> Vec<IeeeAddr> {
        self.admission.backlog()
    }

    pub async fn simple_desc_req(&self, nwk_addr: u16, ieee_addr: IeeeAddr) -> ControllerResult<DeviceInfo> {
        self.directory.query_device(nwk_addr, ieee_addr).await
    }

    pub async fn bind(
        &self,
        source: EndpointRef,
        cluster_id: u16,
        target: BindTarget,
    ) -> ControllerResult<()> {
        self.set_binding(BindingKind::Bind, source, cluster_id, target)
            .await
    }

    pub async fn unbind(
        &self,
        source: EndpointRef,
        cluster_id: u16,
        target: BindTarget,
    ) -> ControllerResult<()> {
        self.set_binding(BindingKind::Unbind, source, cluster_id, target)
            .await
    }

    async fn set_binding(
        &self,
        kind: BindingKind,
        source: EndpointRef,
        cluster_id: u16,
        target: BindTarget,
    ) -> ControllerResult<()> {
        debug!(
            "{} cluster 0x{:04x} of {}:{} to {:?}",
            kind, cluster_id, source.ieee_addr, source.endpoint, target
        );
        self.directory
            .set_binding_entry(kind, source, cluster_id, target)
            .await
    }

    /// Ask `device` for its node descriptor, retried once.
    ///
    /// A device that answers while marked offline is re-admitted.
    pub async fn check_online(&self, device: &DeviceRef) -> bool {
        let args = json!({
            "dstaddr": device.nwk_addr,
            "nwkaddrofinterest": device.nwk_addr,
        });

        let mut reply = self.node_desc(args.clone()).await;
        if let Err(e) = &reply {
            debug!("Node descriptor of {} failed ({}), retrying", device.ieee_addr, e);
            reply = self.node_desc(args).await;
        }

        match reply {
            Ok(_) => {
                if device.status == DeviceStatus::Offline {
                    info!("Device {} is back online", device.ieee_addr);
                    self.admission.submit(DeviceAnnounce {
                        nwk_addr: device.nwk_addr,
                        ieee_addr: device.ieee_addr,
                        capabilities: 0,
                    });
                }
                true
            }
            Err(e) => {
                warn!("Device {} is not responding: {}", device.ieee_addr, e);
                false
            }
        }
    }

    async fn node_desc(&self, args: Value) -> ControllerResult<Value> {
        time::timeout(
            self.check_online_timeout,
            self.dispatcher.dispatch(Subsystem::Zdo, "nodeDescReq", args),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
    }
}
