//! A tracking session: one device, one ledger, one ordered stream of readings.
//!
//! The session owns the device connection for its whole lifetime. Shutdown
//! runs at most once, whether it is triggered by a quit request, by an error
//! bubbling out of [`Session::run`], or by the session being dropped.

use crossbeam_channel::{never, select, Receiver};

use crate::catalog::EffectiveActivitySet;
use crate::device::{DeviceCandidate, DeviceConnection, DeviceTransport, FaceId};
use crate::dispatcher::FaceChangeDispatcher;
use crate::error::{TrackerError, TrackerResult};
use crate::ledger::{IntervalLedger, LedgerEffect};
use crate::quit::QuitSignal;
use crate::selector::DeviceSelector;

/// What the final shutdown did.
#[derive(Debug)]
pub struct ShutdownReport {
    /// Effect of the forced transition to "no activity"; `None` if the
    /// session had already been shut down
    pub final_effect: Option<LedgerEffect>,
    /// Disconnect failure, absorbed because the session was ending anyway
    pub disconnect_error: Option<TrackerError>,
}

impl ShutdownReport {
    pub fn already_shut_down(&self) -> bool {
        self.final_effect.is_none()
    }
}

/// A connected tracking session.
pub struct Session<C: DeviceConnection> {
    device: DeviceCandidate,
    connection: Option<C>,
    ledger: IntervalLedger,
    activities: EffectiveActivitySet,
    dispatcher: FaceChangeDispatcher,
    shut_down: bool,
}

impl<C: DeviceConnection> Session<C> {
    pub fn new(
        device: DeviceCandidate,
        connection: C,
        ledger: IntervalLedger,
        activities: EffectiveActivitySet,
    ) -> Self {
        Self {
            device,
            connection: Some(connection),
            ledger,
            activities,
            dispatcher: FaceChangeDispatcher::new(),
            shut_down: false,
        }
    }

    /// Select a device within the selector's window and connect to it.
    pub fn connect<T>(
        transport: &mut T,
        selector: &DeviceSelector,
        ledger: IntervalLedger,
        activities: EffectiveActivitySet,
    ) -> TrackerResult<Self>
    where
        T: DeviceTransport<Connection = C>,
    {
        Self::connect_until(transport, selector, &never(), ledger, activities)
    }

    /// Like [`Session::connect`], but gives up with [`TrackerError::Cancelled`]
    /// as soon as a quit request arrives.
    pub fn connect_until<T>(
        transport: &mut T,
        selector: &DeviceSelector,
        quit: &Receiver<QuitSignal>,
        ledger: IntervalLedger,
        activities: EffectiveActivitySet,
    ) -> TrackerResult<Self>
    where
        T: DeviceTransport<Connection = C>,
    {
        let device = selector.select_until(transport, quit)?;
        if let Ok(signal) = quit.try_recv() {
            tracing::info!(?signal, "Quit requested before connecting");
            return Err(TrackerError::Cancelled(signal));
        }
        let connection = transport.connect(&device)?;
        tracing::info!(device = %device.address, "Connected");
        Ok(Self::new(device, connection, ledger, activities))
    }

    pub fn device(&self) -> &DeviceCandidate {
        &self.device
    }

    pub fn current_face(&self) -> FaceId {
        self.dispatcher.current_face()
    }

    /// Face readings applied so far, including the initial read.
    pub fn readings(&self) -> u64 {
        self.dispatcher.readings()
    }

    pub fn activities(&self) -> &EffectiveActivitySet {
        &self.activities
    }

    pub fn ledger(&self) -> &IntervalLedger {
        &self.ledger
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Track face changes until a quit request arrives.
    ///
    /// Errors are returned without shutting down; call [`Session::shutdown`]
    /// (or drop the session) afterwards either way.
    pub fn run(&mut self, quit: &Receiver<QuitSignal>) -> TrackerResult<QuitSignal> {
        self.ledger.recover_open_intervals()?;

        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| TrackerError::Connection("session already shut down".to_string()))?;

        // Subscribe before the initial read so no change is missed; queued
        // notifications are only processed after the initial reading.
        let notifications = connection.subscribe()?;
        let initial = connection.read_face()?;
        tracing::info!(face = %initial, activity = self.activities.describe(initial), "Initial face");
        self.dispatcher
            .dispatch(initial, &mut self.ledger, &self.activities)?;

        loop {
            // Readings already delivered are applied before a quit is honoured.
            self.dispatcher
                .drain(&notifications, &mut self.ledger, &self.activities)?;

            select! {
                recv(quit) -> signal => {
                    let signal = signal.unwrap_or(QuitSignal::Interrupt);
                    tracing::info!(?signal, "Quit requested");
                    return Ok(signal);
                }
                recv(notifications) -> reading => match reading {
                    Ok(face) => {
                        self.dispatcher
                            .dispatch(face, &mut self.ledger, &self.activities)?;
                    }
                    Err(_) => {
                        return Err(TrackerError::Connection(
                            "device stopped sending notifications".to_string(),
                        ));
                    }
                },
            }
        }
    }

    /// Close any open interval, then release the device. Runs once; later
    /// calls return a report with no final effect.
    pub fn shutdown(&mut self) -> TrackerResult<ShutdownReport> {
        if self.shut_down {
            return Ok(ShutdownReport {
                final_effect: None,
                disconnect_error: None,
            });
        }
        self.shut_down = true;

        tracing::info!("Finishing current activity");
        let final_effect = self.dispatcher.dispatch(
            FaceId::SENTINEL,
            &mut self.ledger,
            &self.activities,
        );

        tracing::info!("Disconnecting from device");
        let disconnect_error = self.connection.take().and_then(|mut connection| {
            connection.disconnect().err().map(|e| {
                let err = TrackerError::ShutdownDisconnect(e.to_string());
                tracing::warn!(error = %err, "Ignoring disconnect failure during shutdown");
                err
            })
        });

        Ok(ShutdownReport {
            final_effect: Some(final_effect?),
            disconnect_error,
        })
    }
}

impl<C: DeviceConnection> Drop for Session<C> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "Shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::device::scripted::{ScriptedDevice, ScriptedTransport};
    use crate::device::DeviceFilter;
    use crate::store::Store;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    fn cube() -> DeviceCandidate {
        DeviceCandidate::new("cube", Some("Timeular ZEI".to_string()), "AA")
    }

    fn session(device: &ScriptedDevice) -> Session<crate::device::scripted::ScriptedConnection> {
        let store = Store::open_in_memory().unwrap();
        store.insert_activity(FaceId(2), "Dev", 1).unwrap();
        store.insert_activity(FaceId(5), "Meeting", 1).unwrap();
        let activities = EffectiveActivitySet::load(&store).unwrap();
        let ledger = IntervalLedger::new(store, ManualClock::starting_at(1_000));

        let mut transport = ScriptedTransport::new(vec![cube()], device.clone());
        let selector = DeviceSelector::new(
            DeviceFilter::by_name("Timeular ZEI"),
            Duration::from_secs(1),
        );
        Session::connect(&mut transport, &selector, ledger, activities).unwrap()
    }

    #[test]
    fn test_initial_reading_opens_interval() {
        let device = ScriptedDevice::new(FaceId(2));
        let mut session = session(&device);
        let (quit_tx, quit_rx) = unbounded();
        quit_tx.send(QuitSignal::Keypress).unwrap();

        assert_eq!(session.run(&quit_rx).unwrap(), QuitSignal::Keypress);
        assert_eq!(session.current_face(), FaceId(2));
        assert_eq!(session.readings(), 1);
        assert_eq!(session.ledger().store().open_intervals().unwrap().len(), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let device = ScriptedDevice::new(FaceId(5));
        let mut session = session(&device);
        let (quit_tx, quit_rx) = unbounded();
        quit_tx.send(QuitSignal::Interrupt).unwrap();
        session.run(&quit_rx).unwrap();

        let first = session.shutdown().unwrap();
        assert!(!first.already_shut_down());
        let after_first = session.ledger().store().intervals().unwrap();

        let second = session.shutdown().unwrap();
        assert!(second.already_shut_down());
        assert_eq!(session.ledger().store().intervals().unwrap(), after_first);
        assert!(after_first.iter().all(|i| !i.is_open()));
        assert_eq!(device.disconnect_count(), 1);
    }

    #[test]
    fn test_disconnect_failure_is_not_fatal() {
        let device = ScriptedDevice::new(FaceId(2));
        device.fail_disconnect();
        let mut session = session(&device);
        let (quit_tx, quit_rx) = unbounded();
        quit_tx.send(QuitSignal::Keypress).unwrap();
        session.run(&quit_rx).unwrap();

        let report = session.shutdown().unwrap();
        assert!(matches!(
            report.disconnect_error,
            Some(TrackerError::ShutdownDisconnect(_))
        ));
        assert!(session.ledger().store().open_intervals().unwrap().is_empty());
    }

    #[test]
    fn test_lost_stream_is_a_connection_error() {
        let device = ScriptedDevice::new(FaceId(2));
        let mut session = session(&device);
        device.hang_up();
        let (_quit_tx, quit_rx) = unbounded();

        let err = session.run(&quit_rx).unwrap_err();
        assert!(matches!(err, TrackerError::Connection(_)));

        session.shutdown().unwrap();
        assert!(session.ledger().store().open_intervals().unwrap().is_empty());
    }

    #[test]
    fn test_drop_shuts_down() {
        let device = ScriptedDevice::new(FaceId(2));
        {
            let _session = session(&device);
        }
        assert!(!device.is_connected());
        assert_eq!(device.disconnect_count(), 1);
    }
}
