//! Bluetooth LE transport using btleplug.
//!
//! btleplug is async; the tracker loop is not. A dedicated multi-threaded
//! tokio runtime drives the adapter, and scan results and notifications are
//! forwarded onto crossbeam channels so they keep arriving while the caller
//! blocks on them.

use crate::device::{
    DeviceCandidate, DeviceConnection, DeviceFilter, DeviceTransport, FaceId, TransportError,
    FACE_CHANGE_CHARACTERISTIC_UUID, PRIMARY_SERVICE_UUID,
};
use btleplug::api::{Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use crossbeam_channel::{unbounded, Receiver};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// BLE transport bound to the first system adapter.
pub struct BleTransport {
    runtime: Arc<Runtime>,
    adapter: Adapter,
    scan_task: Option<JoinHandle<()>>,
    discovered: HashMap<String, Peripheral>,
    scan_results: Option<Receiver<(DeviceCandidate, Peripheral)>>,
}

impl BleTransport {
    /// Create a transport on the first available adapter.
    pub fn new() -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| TransportError::Scan(format!("Failed to create runtime: {e}")))?;

        let adapter = runtime.block_on(async {
            let manager = Manager::new()
                .await
                .map_err(|e| TransportError::Scan(e.to_string()))?;
            let adapters = manager
                .adapters()
                .await
                .map_err(|e| TransportError::Scan(e.to_string()))?;
            adapters.into_iter().next().ok_or(TransportError::NoAdapter)
        })?;

        Ok(Self {
            runtime: Arc::new(runtime),
            adapter,
            scan_task: None,
            discovered: HashMap::new(),
            scan_results: None,
        })
    }

    fn peripheral_for(&mut self, candidate: &DeviceCandidate) -> Option<Peripheral> {
        if let Some(results) = &self.scan_results {
            while let Ok((seen, peripheral)) = results.try_recv() {
                self.discovered.insert(seen.id, peripheral);
            }
        }
        self.discovered.get(&candidate.id).cloned()
    }
}

impl DeviceTransport for BleTransport {
    type Connection = BleConnection;

    fn start_scan(
        &mut self,
        filter: &DeviceFilter,
    ) -> Result<Receiver<DeviceCandidate>, TransportError> {
        let adapter = self.adapter.clone();
        let wanted = filter.name.clone();

        let mut events = self
            .runtime
            .block_on(async {
                let events = adapter.events().await?;
                adapter.start_scan(ScanFilter::default()).await?;
                Ok::<_, btleplug::Error>(events)
            })
            .map_err(|e| TransportError::Scan(e.to_string()))?;

        let (candidate_tx, candidate_rx) = unbounded();
        let (result_tx, result_rx) = unbounded();

        let task = self.runtime.spawn(async move {
            while let Some(event) = events.next().await {
                let id: PeripheralId = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                    _ => continue,
                };
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                if properties.local_name.as_deref() != Some(wanted.as_str()) {
                    continue;
                }

                let candidate = DeviceCandidate::new(
                    format!("{id:?}"),
                    properties.local_name.clone(),
                    properties.address.to_string(),
                );
                tracing::debug!(device = %candidate.address, "Discovered candidate");
                if result_tx.send((candidate.clone(), peripheral)).is_err()
                    || candidate_tx.send(candidate).is_err()
                {
                    break;
                }
            }
        });

        self.scan_task = Some(task);
        self.scan_results = Some(result_rx);
        Ok(candidate_rx)
    }

    fn stop_scan(&mut self) {
        if let Some(task) = self.scan_task.take() {
            task.abort();
            let adapter = self.adapter.clone();
            if let Err(e) = self.runtime.block_on(adapter.stop_scan()) {
                tracing::warn!(error = %e, "Failed to stop scan");
            }
        }
    }

    fn connect(&mut self, candidate: &DeviceCandidate) -> Result<BleConnection, TransportError> {
        let peripheral = self
            .peripheral_for(candidate)
            .ok_or_else(|| TransportError::Connect {
                device: candidate.id.clone(),
                reason: "device was not seen during the scan".to_string(),
            })?;

        let connect_err = |e: btleplug::Error| TransportError::Connect {
            device: candidate.address.clone(),
            reason: e.to_string(),
        };

        let characteristic = self.runtime.block_on(async {
            peripheral.connect().await.map_err(connect_err)?;
            peripheral.discover_services().await.map_err(connect_err)?;

            peripheral
                .characteristics()
                .into_iter()
                .find(|c| {
                    c.service_uuid == PRIMARY_SERVICE_UUID
                        && c.uuid == FACE_CHANGE_CHARACTERISTIC_UUID
                })
                .ok_or_else(|| {
                    TransportError::MissingCharacteristic(FACE_CHANGE_CHARACTERISTIC_UUID.to_string())
                })
        })?;

        Ok(BleConnection {
            runtime: self.runtime.clone(),
            peripheral,
            characteristic,
            notify_task: None,
        })
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.stop_scan();
    }
}

/// Connection to the cube's face characteristic.
pub struct BleConnection {
    runtime: Arc<Runtime>,
    peripheral: Peripheral,
    characteristic: Characteristic,
    notify_task: Option<JoinHandle<()>>,
}

impl DeviceConnection for BleConnection {
    fn read_face(&mut self) -> Result<FaceId, TransportError> {
        let value = self
            .runtime
            .block_on(self.peripheral.read(&self.characteristic))
            .map_err(|e| TransportError::Read(e.to_string()))?;
        FaceId::from_raw(&value).ok_or_else(|| TransportError::Read("empty value".to_string()))
    }

    fn subscribe(&mut self) -> Result<Receiver<FaceId>, TransportError> {
        let peripheral = self.peripheral.clone();
        let characteristic = self.characteristic.clone();

        let mut stream = self
            .runtime
            .block_on(async {
                let stream = peripheral.notifications().await?;
                peripheral.subscribe(&characteristic).await?;
                Ok::<_, btleplug::Error>(stream)
            })
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        let (sender, receiver) = unbounded();
        let task = self.runtime.spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid != FACE_CHANGE_CHARACTERISTIC_UUID {
                    continue;
                }
                let Some(face) = FaceId::from_raw(&notification.value) else {
                    continue;
                };
                if sender.send(face).is_err() {
                    break;
                }
            }
        });

        self.notify_task = Some(task);
        Ok(receiver)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        self.runtime
            .block_on(self.peripheral.disconnect())
            .map_err(|e| TransportError::Disconnect(e.to_string()))
    }
}
