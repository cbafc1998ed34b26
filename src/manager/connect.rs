//! Acting on selections: arbitration, handoffs and failure retries.

use super::{ConnectivityManager, Handoff, PendingRequest, RequestPurpose, REQUESTOR};
use crate::attempt::AttemptVerdict;
use crate::blocklist::{BlockKey, BlockReason};
use crate::candidate::Candidate;
use crate::diag::stats::bump;
use crate::event::{AttemptOutcome, FailureCode};
use crate::session::{
    decide, ArbiterAction, ArbiterPolicy, SessionError, SessionId, SessionInfo, SessionRole,
};
use crate::state::ConnectivityState;
use crate::timer::TimerTag;
use crate::wifi::{Bssid, NetworkConfig, NetworkKey};
use log::{debug, info, warn};
use std::sync::atomic::AtomicUsize;
use std::time::Instant;

/// Count a successful session call, log a failed one.
fn tally(result: Result<(), SessionError>, what: &str, counter: &AtomicUsize) {
    match result {
        Ok(()) => bump(counter),
        Err(e) => warn!("Session {} failed: {}", what, e),
    }
}

impl ConnectivityManager {
    /// Move the primary session to `target`.
    pub(super) fn connect_primary(&mut self, target: Candidate, now: Instant) {
        if self.handoff_in_progress() {
            debug!("Handoff in progress, not acting on {}", target.ssid);
            return;
        }
        let Some(network) = self.store.network(&target.network) else {
            debug!("Network {} is gone", target.network);
            return;
        };
        let Some(primary) = self.sessions.primary() else {
            debug!("No primary session");
            return;
        };

        let current = primary
            .network
            .as_ref()
            .and_then(|key| self.store.network(key));
        let policy = ArbiterPolicy {
            firmware_roaming: self.config.features.firmware_roaming,
            make_before_break: self.config.features.make_before_break,
        };
        let action = decide(&network, target.bssid, &primary, current.as_ref(), &policy);
        if let ArbiterAction::NoOp(reason) = action {
            debug!("Not connecting to {} ({}): {}", target.ssid, target.bssid, reason);
            return;
        }
        if !self.admit_attempt(now) {
            return;
        }

        self.note(
            now,
            format!(
                "{}: {} {} {} MHz {} dBm",
                action, target.ssid, target.bssid, target.frequency_mhz, target.rssi_dbm
            ),
        );
        match action {
            ArbiterAction::Connect { session } => {
                let result = self.sessions.connect(session, &network, target.bssid);
                tally(result, "connect", &self.stats.connections.connects);
            }
            ArbiterAction::Roam { session } => {
                let result = self.sessions.roam(session, target.bssid);
                tally(result, "roam", &self.stats.connections.roams);
            }
            ArbiterAction::MakeBeforeBreak { old } => {
                match self
                    .sessions
                    .request_session(SessionRole::SecondaryTransient, REQUESTOR)
                {
                    Ok(()) => {
                        self.pending_requests.push(PendingRequest {
                            role: SessionRole::SecondaryTransient,
                            purpose: RequestPurpose::Handoff { old, target },
                            requested_at: now,
                        });
                        self.rearm_request_timeout();
                    }
                    Err(e) => {
                        bump(&self.stats.connections.session_requests_denied);
                        info!("Transient session unavailable ({}), breaking before make", e);
                        self.break_before_make(old, &network, target.bssid);
                    }
                }
            }
            ArbiterAction::BreakBeforeMake { session } => {
                self.break_before_make(session, &network, target.bssid)
            }
            ArbiterAction::NoOp(_) => {}
        }
    }

    fn handoff_in_progress(&self) -> bool {
        self.handoff.is_some()
            || self
                .pending_requests
                .iter()
                .any(|r| matches!(r.purpose, RequestPurpose::Handoff { .. }))
    }

    /// Rate-limit connection attempts. Foreground use waives the limit.
    fn admit_attempt(&mut self, now: Instant) -> bool {
        match self.attempts.check(now, self.screen.is_on()) {
            AttemptVerdict::Accepted => true,
            AttemptVerdict::Waived => {
                debug!("Attempt limit waived in foreground");
                true
            }
            AttemptVerdict::Rejected => {
                bump(&self.stats.connections.rate_limited);
                debug!(
                    "Too many attempts in {:?}, skipping",
                    self.attempts.config().window()
                );
                false
            }
        }
    }

    fn break_before_make(&mut self, session: SessionId, network: &NetworkConfig, bssid: Bssid) {
        bump(&self.stats.connections.break_before_make);
        if let Err(e) = self.sessions.disconnect(session) {
            warn!("Disconnect of {} failed: {}", session, e);
            return;
        }
        let result = self.sessions.connect(session, network, bssid);
        tally(result, "connect", &self.stats.connections.connects);
    }

    /// Ask for a long-lived secondary session on `target`.
    pub(super) fn connect_secondary(&mut self, target: Candidate, now: Instant) {
        match self
            .sessions
            .request_session(SessionRole::SecondaryLongLived, REQUESTOR)
        {
            Ok(()) => {
                self.note(now, format!("Requesting secondary session for {}", target.ssid));
                self.pending_requests.push(PendingRequest {
                    role: SessionRole::SecondaryLongLived,
                    purpose: RequestPurpose::Secondary { target },
                    requested_at: now,
                });
                self.rearm_request_timeout();
            }
            Err(e) => {
                bump(&self.stats.connections.session_requests_denied);
                info!("Secondary session unavailable: {}", e);
            }
        }
    }

    /// Answer to an earlier session request.
    pub(super) fn on_session_granted(
        &mut self,
        role: SessionRole,
        session: Option<SessionInfo>,
        now: Instant,
    ) {
        let Some(index) = self.pending_requests.iter().position(|r| r.role == role) else {
            if let Some(info) = session {
                debug!("Unrequested {} {}, releasing", role, info.id);
                self.release(info.id);
            }
            return;
        };
        let request = self.pending_requests.remove(index);
        self.rearm_request_timeout();

        let Some(info) = session else {
            bump(&self.stats.connections.session_requests_denied);
            match request.purpose {
                RequestPurpose::Handoff { old, target } => {
                    self.note(
                        now,
                        format!("Transient session denied, breaking before make to {}", target.ssid),
                    );
                    if let Some(network) = self.store.network(&target.network) {
                        self.break_before_make(old, &network, target.bssid);
                    }
                }
                RequestPurpose::Secondary { target } => {
                    self.note(now, format!("Secondary session for {} denied", target.ssid));
                }
            }
            return;
        };

        match request.purpose {
            RequestPurpose::Handoff { old, target } => {
                let Some(network) = self.store.network(&target.network) else {
                    self.release(info.id);
                    return;
                };
                match self.sessions.connect(info.id, &network, target.bssid) {
                    Ok(()) => {
                        bump(&self.stats.connections.make_before_break);
                        bump(&self.stats.connections.connects);
                        self.note(
                            now,
                            format!("Make-before-break: {} -> {} for {}", old, info.id, target.ssid),
                        );
                        self.handoff = Some(Handoff {
                            old,
                            new: info.id,
                            target,
                        });
                    }
                    Err(e) => {
                        warn!("Connect on {} failed: {}", info.id, e);
                        self.release(info.id);
                    }
                }
            }
            RequestPurpose::Secondary { target } => {
                if !self.secondary_needed {
                    self.release(info.id);
                    return;
                }
                let Some(network) = self.store.network(&target.network) else {
                    self.release(info.id);
                    return;
                };
                match self.sessions.connect(info.id, &network, target.bssid) {
                    Ok(()) => {
                        bump(&self.stats.connections.secondary_connects);
                        self.note(now, format!("Secondary {} -> {}", info.id, target.ssid));
                        self.secondary = Some(info.id);
                    }
                    Err(e) => {
                        warn!("Secondary connect on {} failed: {}", info.id, e);
                        self.release(info.id);
                    }
                }
            }
        }
    }

    /// Arm the request deadline for the oldest unanswered request.
    pub(super) fn rearm_request_timeout(&mut self) {
        let timeout = self.config.session_request_timeout();
        match self.pending_requests.iter().map(|r| r.requested_at).min() {
            Some(oldest) => self
                .timers
                .schedule(TimerTag::SessionRequest, oldest + timeout),
            None => {
                self.timers.cancel(TimerTag::SessionRequest);
            }
        }
    }

    /// Give up on requests nobody answered in time. A late grant is then
    /// released as unrequested.
    pub(super) fn expire_session_requests(&mut self, now: Instant) {
        let timeout = self.config.session_request_timeout();
        let (expired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_requests)
            .into_iter()
            .partition(|r| r.requested_at + timeout <= now);
        self.pending_requests = pending;
        self.rearm_request_timeout();

        for request in expired {
            bump(&self.stats.connections.session_requests_denied);
            match request.purpose {
                RequestPurpose::Handoff { old, target } => {
                    self.note(
                        now,
                        format!(
                            "Transient session request timed out, breaking before make to {}",
                            target.ssid
                        ),
                    );
                    if let Some(network) = self.store.network(&target.network) {
                        self.break_before_make(old, &network, target.bssid);
                    }
                }
                RequestPurpose::Secondary { target } => {
                    self.note(
                        now,
                        format!("Secondary session request for {} timed out", target.ssid),
                    );
                }
            }
        }
    }

    /// The primary `old` went down: a handoff away from it has nothing left
    /// to hand off from, so the plain connect path takes over.
    pub(super) fn abandon_handoff(&mut self, old: SessionId, now: Instant) {
        let before = self.pending_requests.len();
        self.pending_requests.retain(
            |r| !matches!(r.purpose, RequestPurpose::Handoff { old: o, .. } if o == old),
        );
        if self.pending_requests.len() != before {
            self.rearm_request_timeout();
            self.note(now, format!("Primary {} lost, dropping handoff request", old));
        }

        if self.handoff.as_ref().is_some_and(|h| h.old == old) {
            if let Some(handoff) = self.handoff.take() {
                self.note(
                    now,
                    format!(
                        "Primary {} lost, abandoning handoff to {} on {}",
                        old, handoff.target.ssid, handoff.new
                    ),
                );
                self.release(handoff.new);
            }
        }
    }

    /// The new session is up: promote it and drop the old one.
    pub(super) fn complete_handoff(&mut self, now: Instant) {
        let Some(handoff) = self.handoff.take() else {
            return;
        };
        if let Err(e) = self.sessions.promote_to_primary(handoff.new) {
            warn!("Promote of {} failed: {}", handoff.new, e);
            self.release(handoff.new);
            return;
        }
        self.release(handoff.old);
        self.note(
            now,
            format!("Handoff to {} on {} complete", handoff.target.ssid, handoff.new),
        );
        self.set_connectivity(ConnectivityState::Connected, now);
    }

    /// The new session did not come up; the old one stays.
    pub(super) fn fail_handoff(&mut self, reason: &str, now: Instant) {
        let Some(handoff) = self.handoff.take() else {
            return;
        };
        self.note(
            now,
            format!("Handoff to {} failed: {}", handoff.target.ssid, reason),
        );
        self.release(handoff.new);
    }

    pub(super) fn handle_attempt_ended(
        &mut self,
        session: SessionId,
        outcome: AttemptOutcome,
        bssid: Bssid,
        network: &NetworkKey,
        now: Instant,
    ) {
        let handoff_session = self.handoff.as_ref().is_some_and(|h| h.new == session);
        let code = match outcome {
            AttemptOutcome::Success => {
                self.blocklist.note_success(bssid, network);
                if handoff_session {
                    self.complete_handoff(now);
                } else if self.is_primary(session) {
                    self.candidates.clear();
                }
                return;
            }
            AttemptOutcome::Failure(code) => code,
        };

        self.record_failure(bssid, network, code, now);
        if handoff_session {
            self.fail_handoff(&code.to_string(), now);
        } else if self.secondary == Some(session) {
            self.note(now, format!("Secondary {} failed ({}), releasing", session, code));
            self.secondary = None;
            self.release(session);
        } else if self.is_primary(session) {
            self.retry_after_failure(bssid, network, code, now);
        }
    }

    fn is_primary(&self, session: SessionId) -> bool {
        self.sessions
            .session(session)
            .is_some_and(|s| s.role == SessionRole::Primary)
    }

    fn record_failure(&mut self, bssid: Bssid, network: &NetworkKey, code: FailureCode, now: Instant) {
        let verdict = self
            .blocklist
            .note_failure(bssid, network, code.is_credential(), now);
        if verdict.bssid_blocked {
            bump(&self.stats.connections.blocklist_additions);
        }
        if verdict.network_blocked {
            bump(&self.stats.connections.blocklist_additions);
            self.store.set_enabled(network, false);
            self.candidates.remove_network(network);
            self.note(now, format!("Disabled network {} after credential failures", network));
        }
    }

    /// One local retry from the cached candidates, if they are still fresh.
    fn retry_after_failure(
        &mut self,
        bssid: Bssid,
        network: &NetworkKey,
        code: FailureCode,
        now: Instant,
    ) {
        if !self.candidates.is_fresh(now) {
            debug!("Candidates stale, no retry after {} failure", code);
            return;
        }
        let same_network = code.is_credential().then_some(network);
        if self.candidates.remove_failed(bssid, same_network) == 0 {
            debug!("Failed access point not cached, no retry");
            return;
        }

        let sessions = self.sessions.sessions();
        let exclude = self.primary_exclusions(&sessions, now);
        let Some(next) = self
            .selector
            .select_network(self.candidates.candidates(), &exclude)
        else {
            debug!("No candidate left to retry");
            return;
        };

        self.blocklist.block(
            BlockKey::Bssid(bssid),
            BlockReason::RetryHold,
            self.config.retry_block(),
            now,
        );
        bump(&self.stats.connections.local_retries);
        self.note(
            now,
            format!("Retrying with {} {} after {} on {}", next.ssid, next.bssid, code, bssid),
        );
        self.connect_primary(next, now);
    }
}
