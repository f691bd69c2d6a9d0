//! Unit-of-work manager.
//!
//! Transactional (tRFC), queued (qRFC) and background (bgRFC) units share
//! one lifecycle:
//!
//! ```text
//! initialize_unit ─▶ fill_and_submit_unit ─▶ confirm_unit
//!                                        └─▶ destroy_unit
//! ```
//!
//! A session holds at most one active unit, from a successful
//! [`fill_and_submit_unit`](Connection::fill_and_submit_unit) until the
//! unit is confirmed or destroyed.

use tracing::{debug, info, warn};

use rfcbridge_common::{
    Result, RfcError, Unit, UnitAttributes, UnitCall, UnitFamily, UnitIdentifier, UnitState,
    UnitType,
};

use crate::backend::{FunctionContainer, RfcBackend};
use crate::codec::fill_parameters;
use crate::connection::{ActiveUnit, Connection};

impl<B: RfcBackend> Connection<B> {
    /// Creates a unit descriptor with a fresh backend identifier.
    ///
    /// Background units get a 32-character id, transactional ones a
    /// 24-character id.
    pub fn initialize_unit(&mut self, background: bool) -> Result<Unit> {
        self.ensure_alive()?;
        let result = if background {
            self.backend_mut().unit_id()
        } else {
            self.backend_mut().transaction_id()
        };
        let id = self.check(result)?;
        let unit = Unit::new(id, background);
        unit.validate()?;
        debug!(unit_id = %unit.id, family = %unit.family(), "Initialized unit");
        Ok(unit)
    }

    /// Runs `calls` inside a new unit and submits it.
    ///
    /// For background units, zero queue names create a synchronous (`T`)
    /// unit and any queue name a queued (`Q`) one. For transactional units,
    /// zero queue names select tRFC and exactly one selects qRFC; attributes
    /// are not supported there.
    ///
    /// On success the unit stays active on this session and `unit.queued`
    /// is set. If any call or the submission fails, the unit is destroyed
    /// and the error returned.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for a malformed id, an empty call list, more than
    ///   one queue name or attributes on a transactional unit
    /// - `State` when a unit is already active on this session
    /// - any fill or backend error of the calls or the submission
    pub fn fill_and_submit_unit(
        &mut self,
        unit: &mut Unit,
        calls: &[UnitCall],
        queue_names: &[String],
        attributes: Option<&UnitAttributes>,
    ) -> Result<()> {
        unit.validate()?;
        if calls.is_empty() {
            return Err(RfcError::InvalidArgument(
                "calls must be a non-empty sequence".to_string(),
            ));
        }
        if unit.family() == UnitFamily::Transactional {
            if attributes.is_some() {
                return Err(RfcError::InvalidArgument(
                    "unit attributes are only supported for background units".to_string(),
                ));
            }
            if queue_names.len() > 1 {
                return Err(RfcError::InvalidArgument(format!(
                    "a transactional unit takes at most one queue name, received {}",
                    queue_names.len()
                )));
            }
        }
        if let Some(active) = &self.active_unit {
            return Err(RfcError::State(format!(
                "unit {} is still active on this connection",
                active.id()
            )));
        }
        self.ensure_alive()?;

        let queued = match unit.family() {
            UnitFamily::Background => {
                let attributes = attributes.cloned().unwrap_or_default().truncated();
                let result = self
                    .backend_mut()
                    .create_unit(&unit.id, queue_names, &attributes);
                let (handle, identifier) = self.check(result)?;
                let queued = identifier.is_queued();
                self.active_unit = Some(ActiveUnit::Background { handle, identifier });
                queued
            }
            UnitFamily::Transactional => {
                let queue = queue_names.first().map(String::as_str);
                let result = self.backend_mut().create_transaction(&unit.id, queue);
                let handle = self.check(result)?;
                self.active_unit = Some(ActiveUnit::Transaction {
                    handle,
                    id: unit.id.clone(),
                });
                queue.is_some()
            }
        };
        info!(
            unit_id = %unit.id,
            family = %unit.family(),
            queued,
            calls = calls.len(),
            "Created unit"
        );

        if let Err(e) = self.run_active_unit(calls) {
            warn!(unit_id = %unit.id, error = %e, "Unit failed, destroying it");
            if let Some(active) = self.active_unit.take() {
                if let Err(destroy_error) = self.destroy_backend_unit(&active) {
                    debug!(error = %destroy_error, "Failed unit could not be destroyed");
                }
            }
            return Err(e);
        }

        unit.mark_submitted(queued);
        info!(unit_id = %unit.id, queued, "Submitted unit");
        Ok(())
    }

    /// Invokes every call inside the active unit, then submits it.
    fn run_active_unit(&mut self, calls: &[UnitCall]) -> Result<()> {
        let active = self
            .active_unit
            .clone()
            .ok_or_else(|| RfcError::State("no active unit".to_string()))?;
        let codec = self.codec_options();
        for call in calls {
            debug!(unit_id = %active.id(), function = %call.function, "Adding call to unit");
            let description = self.describe(&call.function)?;
            let mut function = self.create_function(&description)?;
            fill_parameters(function.parameters_mut(), &description, &call.params, codec)?;
            let backend = self.backend_mut();
            let result = match &active {
                ActiveUnit::Transaction { handle, .. } => {
                    backend.invoke_in_transaction(*handle, &mut function)
                }
                ActiveUnit::Background { handle, .. } => {
                    backend.invoke_in_unit(*handle, &mut function)
                }
            };
            self.check(result)?;
        }
        let backend = self.backend_mut();
        let result = match &active {
            ActiveUnit::Transaction { handle, .. } => backend.submit_transaction(*handle),
            ActiveUnit::Background { handle, .. } => backend.submit_unit(*handle),
        };
        self.check(result)
    }

    /// Processing state of a background unit.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a transactional unit: that family has no state
    /// inspection.
    pub fn get_unit_state(&mut self, unit: &Unit) -> Result<UnitState> {
        unit.validate()?;
        if unit.family() != UnitFamily::Background {
            return Err(RfcError::InvalidArgument(
                "unit state is only available for background units".to_string(),
            ));
        }
        let queued = unit.queued.unwrap_or(false);
        let identifier = match &self.active_unit {
            Some(ActiveUnit::Background { identifier, .. }) if identifier.id == unit.id => {
                identifier.clone()
            }
            _ if queued => UnitIdentifier::new(UnitType::Queued, unit.id.clone()),
            _ => UnitIdentifier::new(UnitType::Transactional, unit.id.clone()),
        };
        self.ensure_alive()?;
        let result = self.backend_mut().unit_state(&identifier);
        let state = self.check(result)?;
        debug!(unit_id = %unit.id, state = %state, "Queried unit state");
        Ok(state)
    }

    /// Confirms the active unit with the backend, then releases it.
    ///
    /// A failed confirmation leaves the unit active, so it can be retried
    /// or destroyed. Once confirmed, a failure to release the handle is
    /// only logged.
    pub fn confirm_unit(&mut self, unit: &mut Unit) -> Result<()> {
        let active = self.matching_active_unit(unit)?;
        let backend = self.backend_mut();
        let result = match &active {
            ActiveUnit::Transaction { handle, .. } => backend.confirm_transaction(*handle),
            ActiveUnit::Background { identifier, .. } => backend.confirm_unit(identifier),
        };
        self.check(result)?;
        self.active_unit = None;
        unit.mark_confirmed();
        info!(unit_id = %unit.id, "Confirmed unit");
        if let Err(e) = self.destroy_backend_unit(&active) {
            debug!(unit_id = %unit.id, error = %e, "Confirmed unit could not be released");
        }
        Ok(())
    }

    /// Releases the active unit without confirming it.
    ///
    /// The session's active slot is cleared even when the backend fails to
    /// release the handle.
    pub fn destroy_unit(&mut self, unit: &mut Unit) -> Result<()> {
        let active = self.matching_active_unit(unit)?;
        self.active_unit = None;
        unit.mark_destroyed();
        info!(unit_id = %unit.id, "Destroying unit");
        self.destroy_backend_unit(&active)
    }

    fn matching_active_unit(&self, unit: &Unit) -> Result<ActiveUnit> {
        unit.validate()?;
        match &self.active_unit {
            Some(active) if active.family() == unit.family() && active.id() == unit.id => {
                Ok(active.clone())
            }
            Some(active) => Err(RfcError::State(format!(
                "active unit is {} {}, not {} {}",
                active.family(),
                active.id(),
                unit.family(),
                unit.id
            ))),
            None => Err(RfcError::State(format!(
                "no {} unit is active on this connection",
                unit.family()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use rfcbridge_common::{ConnectionConfig, ConnectionParams, Record};

    fn connection() -> Connection<MemoryBackend> {
        let backend = MemoryBackend::new();
        let params = ConnectionParams::new().with("ashost", "localhost");
        let config = ConnectionConfig::default();
        Connection::open(backend, params, config).unwrap()
    }

    fn ping() -> Vec<UnitCall> {
        vec![UnitCall::new("RFC_PING", Record::new())]
    }

    fn submit(conn: &mut Connection<MemoryBackend>, unit: &mut Unit) -> Result<()> {
        conn.fill_and_submit_unit(unit, &ping(), &[], None)
    }

    #[test]
    fn test_wrong_id_length_fails_before_backend() {
        let mut conn = connection();
        let mut unit = Unit::new("SHORT", true);
        let err = submit(&mut conn, &mut unit).unwrap_err();
        assert!(matches!(err, RfcError::InvalidArgument(_)));
        assert!(conn.backend().executions().is_empty());
        assert!(conn.active_unit.is_none());
    }

    #[test]
    fn test_empty_calls() {
        let mut conn = connection();
        let mut unit = conn.initialize_unit(false).unwrap();
        let err = conn
            .fill_and_submit_unit(&mut unit, &[], &[], None)
            .unwrap_err();
        assert!(matches!(err, RfcError::InvalidArgument(_)));
    }

    #[test]
    fn test_transactional_rejects_empty_attributes() {
        let mut conn = connection();
        let mut unit = conn.initialize_unit(false).unwrap();
        let attributes = UnitAttributes::default();
        let err = conn
            .fill_and_submit_unit(&mut unit, &ping(), &[], Some(&attributes))
            .unwrap_err();
        assert!(matches!(err, RfcError::InvalidArgument(_)));
    }

    #[test]
    fn test_confirm_requires_matching_family() {
        let mut conn = connection();
        let mut unit = conn.initialize_unit(false).unwrap();
        submit(&mut conn, &mut unit).unwrap();

        let mut other = Unit::new("B".repeat(32), true);
        let err = conn.confirm_unit(&mut other).unwrap_err();
        assert!(matches!(err, RfcError::State(_)));
        assert!(conn.active_unit.is_some());

        conn.confirm_unit(&mut unit).unwrap();
        assert!(conn.active_unit.is_none());
    }

    #[test]
    fn test_failed_confirm_keeps_unit_active() {
        let mut conn = connection();
        let mut unit = conn.initialize_unit(true).unwrap();
        submit(&mut conn, &mut unit).unwrap();

        conn.backend_mut().drop_link();
        let err = conn.confirm_unit(&mut unit).unwrap_err();
        assert!(err.is_connection_fatal());
        assert!(conn.active_unit.is_some());

        conn.destroy_unit(&mut unit).unwrap();
        assert!(conn.active_unit.is_none());
    }
}
