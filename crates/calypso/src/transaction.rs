//! Calypso secure session state machine
//!
//! ```text
//! Idle --select--> Selected --open--> SessionOpen --close--> SessionClosing --> Closed
//!                     ^                   |  ^                    |              |
//!                     +------abort--------+  +--execute--+        +--> Failed    +--open--> SessionOpen
//! ```
//!
//! A [`PoTransaction`] owns the PO and SAM transports for the whole lifecycle.
//! Every exchange is sequential: each command is built from what the previous
//! responses returned. Any failure once the cards have been addressed moves the
//! transaction to [`SessionState::Failed`]; nothing is retried since
//! the card side state already advanced. Callers then treat the transaction as
//! not committed.

use derive_more::Display;
use keyple_core::selection::AidSelector;
use keyple_core::command::MAX_DATA_LENGTH;
use keyple_core::{Bytes, CardTransport, Response};
use tracing::{debug, info, warn};

use crate::buffer::ModificationBuffer;
use crate::commands::session::{self, CloseSessionResponse, SecureSession};
use crate::commands::{CalypsoApdu, CommandKind, sam};
use crate::digest::DigestAccumulator;
use crate::key::{AccessLevel, KeyReference, UNDEFINED_KIF};
use crate::po::CalypsoPo;
use crate::revision::SamRevision;
use crate::settings::{ModificationMode, RatificationMode, SecuritySettings, TransmissionMode};
use crate::{Error, Result};

/// Status word of a Close Session whose terminal signature is wrong
const INCORRECT_SIGNATURE: u16 = 0x6988;

/// Lifecycle state of a PO transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    /// No PO selected
    #[display("IDLE")]
    Idle,
    /// PO application selected, no session open
    #[display("SELECTED")]
    Selected,
    /// Secure session open
    #[display("SESSION_OPEN")]
    SessionOpen,
    /// Close sequence in progress
    #[display("SESSION_CLOSING")]
    SessionClosing,
    /// Last session closed and authenticated
    #[display("CLOSED")]
    Closed,
    /// A session failed, nothing it did can be trusted
    #[display("FAILED")]
    Failed,
}

/// Result of a successful close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Commands sent in each sub-session, in order
    pub sub_sessions: Vec<Vec<CalypsoApdu>>,
    /// Postponed data returned by the last Close Session
    pub postponed_data: Bytes,
}

impl SessionOutcome {
    /// Number of sub-sessions the commands were spread over
    pub fn sub_session_count(&self) -> usize {
        self.sub_sessions.len()
    }

    /// Every command in the order it was sent
    pub fn commands(&self) -> impl Iterator<Item = &CalypsoApdu> {
        self.sub_sessions.iter().flatten()
    }
}

/// Parameters of the session currently open
#[derive(Debug, Clone)]
struct OpenSession {
    access_level: AccessLevel,
    secure_session: SecureSession,
    buffer: ModificationBuffer,
}

/// Secure transaction between a Calypso PO and a SAM
#[derive(Debug)]
pub struct PoTransaction<P, S> {
    po_reader: P,
    sam_reader: S,
    sam_revision: SamRevision,
    settings: SecuritySettings,
    state: SessionState,
    po: Option<CalypsoPo>,
    diversified: bool,
    session: Option<OpenSession>,
    digest: DigestAccumulator,
    /// Atomic overflow detected in the current session: (required, available)
    overflow: Option<(usize, usize)>,
    sub_sessions: Vec<Vec<CalypsoApdu>>,
}

impl<P, S> PoTransaction<P, S>
where
    P: CardTransport,
    S: CardTransport,
{
    /// Create a transaction over a PO transport and a SAM transport
    pub fn new(po_reader: P, sam_reader: S, sam_revision: SamRevision, settings: SecuritySettings) -> Result<Self> {
        sam_revision.class_byte()?;
        let digest = DigestAccumulator::new(sam_revision, settings.digest_update_mode());
        Ok(Self {
            po_reader,
            sam_reader,
            sam_revision,
            settings,
            state: SessionState::Idle,
            po: None,
            diversified: false,
            session: None,
            digest,
            overflow: None,
            sub_sessions: Vec::new(),
        })
    }

    /// Select the PO application and decode its FCI
    ///
    /// An invalidated DF is a successful selection, flagged on the PO.
    pub fn select_application(&mut self, aid: &[u8]) -> Result<&CalypsoPo> {
        self.ensure_not_in_session("select an application")?;
        let command = AidSelector::new(Bytes::copy_from_slice(aid))?.select_command()?;
        let select = CalypsoApdu::new(command, CommandKind::SelectApplication);

        let fci = select.execute(&mut self.po_reader);
        let po = match fci.and_then(|fci| CalypsoPo::from_fci(&fci, &[])) {
            Ok(po) => po,
            Err(error) => {
                self.po = None;
                self.transition(SessionState::Idle);
                return Err(error);
            }
        };
        Ok(self.install_po(po))
    }

    /// Use a PO obtained from the card selection engine
    pub fn with_selected_po(&mut self, po: CalypsoPo) -> Result<&CalypsoPo> {
        self.ensure_not_in_session("change the selected PO")?;
        Ok(self.install_po(po))
    }

    fn install_po(&mut self, po: CalypsoPo) -> &CalypsoPo {
        if po.is_df_invalidated() {
            info!(serial = %hex::encode_upper(po.serial_number()), "Selected DF is invalidated");
        }
        self.diversified = false;
        self.sub_sessions.clear();
        self.transition(SessionState::Selected);
        self.po.insert(po)
    }

    /// Open a secure session, reading `record` of file `sfi` when `record` is not 0
    pub fn open_session(&mut self, access_level: AccessLevel, sfi: u8, record: u8) -> Result<&SecureSession> {
        if !matches!(self.state, SessionState::Selected | SessionState::Closed) {
            return Err(self.illegal("open a session"));
        }
        self.sub_sessions.clear();
        self.open(access_level, sfi, record)?;
        self.session
            .as_ref()
            .map(|session| &session.secure_session)
            .ok_or_else(|| Error::illegal_state("session missing after opening"))
    }

    fn open(&mut self, access_level: AccessLevel, sfi: u8, record: u8) -> Result<()> {
        let po = self.po.as_ref().ok_or_else(|| Error::illegal_state("no PO selected"))?;
        let variant = po.open_session_variant();
        let serial = Bytes::copy_from_slice(po.serial_number());
        let buffer = ModificationBuffer::new(po.modification_buffer());

        // Arguments are checked before the first byte goes out
        session::open_session(variant, access_level, sfi, record, &[0; 8][..variant.terminal_challenge_length()])?;

        let opened = self.guard(|tx| {
            if !tx.diversified {
                sam::select_diversifier(tx.sam_revision, &serial)?.execute(&mut tx.sam_reader)?;
                tx.diversified = true;
            }

            let challenge_length = variant.terminal_challenge_length();
            let response = sam::get_challenge(tx.sam_revision, challenge_length as u8)?.execute(&mut tx.sam_reader)?;
            let challenge = sam::parse_challenge(response.payload(), challenge_length)?;

            let response = session::open_session(variant, access_level, sfi, record, &challenge)?
                .execute(&mut tx.po_reader)?;
            SecureSession::decode(variant, response.payload())
        })?;

        if !self.settings.is_kvc_authorized(opened.kvc) {
            warn!(kvc = opened.kvc, "PO key version not authorized, aborting session");
            self.guard(|tx| tx.send_abort())?;
            self.transition(SessionState::Selected);
            return Err(Error::UnauthorizedKvc(opened.kvc));
        }

        let kif = if opened.kif == UNDEFINED_KIF {
            self.settings.default_kif(access_level)
        } else {
            opened.kif
        };
        let key = KeyReference::new(kif, opened.kvc);
        let key_record = self.settings.key_record(access_level);
        let encrypted = self.settings.is_encrypted_session();

        self.digest.reset();
        self.digest.set_encryption(encrypted)?;
        self.guard(|tx| tx.digest.seed(&mut tx.sam_reader, key, key_record, variant, &opened.raw_session_data))?;

        debug!(
            %access_level,
            %key,
            ratified = opened.previous_session_ratified,
            sub_session = self.sub_sessions.len() + 1,
            "Secure session opened"
        );
        self.session = Some(OpenSession {
            access_level,
            secure_session: opened,
            buffer,
        });
        self.overflow = None;
        self.sub_sessions.push(Vec::new());
        self.transition(SessionState::SessionOpen);
        Ok(())
    }

    /// Send PO commands inside the open session
    ///
    /// In atomic mode a batch that would overflow the modification buffer is not
    /// sent and the session can only be aborted. In multiple mode the session is
    /// closed and reopened right before the first command that does not fit.
    pub fn execute_commands(&mut self, commands: Vec<CalypsoApdu>) -> Result<Vec<Response>> {
        if self.state != SessionState::SessionOpen {
            return Err(self.illegal("execute session commands"));
        }
        if let Some((required, available)) = self.overflow {
            return Err(Error::ModificationBufferOverflow { required, available });
        }
        if let Some(command) = commands
            .iter()
            .find(|command| command.digest_bytes().len() > MAX_DATA_LENGTH)
        {
            return Err(Error::invalid_argument(format!(
                "{} of {} bytes does not fit in a digest block",
                command.kind(),
                command.digest_bytes().len()
            )));
        }
        let buffer = self.open_session_ref()?.buffer;
        let costs: Vec<usize> = commands.iter().map(|command| buffer.capacity().cost(command)).collect();

        let plan = match self.settings.modification_mode() {
            ModificationMode::Atomic => {
                let required = buffer.used() + costs.iter().sum::<usize>();
                if required > buffer.capacity().units() {
                    warn!(required, capacity = buffer.capacity().units(), "Modification buffer overflow");
                    let available = buffer.remaining();
                    self.overflow = Some((required, available));
                    return Err(Error::ModificationBufferOverflow { required, available });
                }
                vec![0..commands.len()]
            }
            ModificationMode::Multiple => buffer.plan(&costs)?,
        };

        let mut responses = Vec::with_capacity(commands.len());
        for (index, range) in plan.into_iter().enumerate() {
            if index > 0 {
                debug!(before = range.start, "Modification buffer full, splitting session");
                self.split_session()?;
            }
            for position in range {
                let response = self.exchange(&commands[position], costs[position])?;
                responses.push(response);
            }
        }
        self.guard(|tx| tx.digest.flush(&mut tx.sam_reader).map(drop))?;
        Ok(responses)
    }

    fn exchange(&mut self, command: &CalypsoApdu, cost: usize) -> Result<Response> {
        let response = self.guard(|tx| {
            let response = command.execute(&mut tx.po_reader)?;
            tx.digest.update(&command.digest_bytes(), &response.to_bytes())?;
            Ok(response)
        })?;

        if let Some(session) = self.session.as_mut() {
            session.buffer.consume(cost);
        }
        if let Some(current) = self.sub_sessions.last_mut() {
            current.push(command.clone());
        }
        Ok(response)
    }

    /// Close the current sub-session and open the next one at the same access level
    fn split_session(&mut self) -> Result<()> {
        let access_level = self.open_session_ref()?.access_level;
        self.close_current()?;
        self.open(access_level, 0, 0)
    }

    /// Close the session and authenticate it
    pub fn close_session(&mut self) -> Result<SessionOutcome> {
        if self.state != SessionState::SessionOpen {
            return Err(self.illegal("close a session"));
        }
        if let Some((required, available)) = self.overflow {
            warn!(required, available, "Aborting session after modification buffer overflow");
            self.abort_session()?;
            return Err(Error::ModificationBufferOverflow { required, available });
        }
        let postponed_data = self.close_current()?;
        Ok(SessionOutcome {
            sub_sessions: std::mem::take(&mut self.sub_sessions),
            postponed_data,
        })
    }

    fn close_current(&mut self) -> Result<Bytes> {
        let po = self.po.as_ref().ok_or_else(|| Error::illegal_state("no PO selected"))?;
        let class = po.class();
        let signature_length = po.open_session_variant().signature_length();
        let ratification_mode = self.settings.ratification_mode();
        let contactless = self.settings.transmission_mode() == TransmissionMode::Contactless;
        self.transition(SessionState::SessionClosing);

        let closed = self.guard(|tx| {
            let terminal_signature = tx.digest.finalize(&mut tx.sam_reader, signature_length)?;

            let close = session::close_session(
                class,
                ratification_mode == RatificationMode::CloseRatified,
                &terminal_signature,
            )?;
            let response = tx.po_reader.transmit(close.command())?;
            if response.status().to_u16() == INCORRECT_SIGNATURE {
                warn!("PO rejected the terminal session signature");
                return Err(Error::SessionAuthenticationFailed {
                    status: response.status(),
                });
            }
            close.check(&response)?;

            if contactless && ratification_mode == RatificationMode::CloseNotRatified {
                // Any answer, or none, ratifies the session
                match tx.po_reader.transmit(session::ratification(class).command()) {
                    Ok(ratification) => debug!(status = %ratification.status(), "Ratification sent"),
                    Err(error) => debug!(%error, "Ratification not answered"),
                }
            }

            let closing = CloseSessionResponse::decode(response.payload(), signature_length)?;
            tx.digest.authenticate(&mut tx.sam_reader, &closing.signature)?;
            Ok(closing)
        })?;

        self.session = None;
        self.transition(SessionState::Closed);
        debug!(sub_sessions = self.sub_sessions.len(), "Secure session closed and authenticated");
        Ok(closed.postponed_data)
    }

    /// Abort the session without committing anything
    pub fn abort_session(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::SessionOpen | SessionState::SessionClosing | SessionState::Failed
        ) || self.po.is_none()
        {
            return Err(self.illegal("abort a session"));
        }
        self.guard(|tx| tx.send_abort())?;
        self.digest.reset();
        self.session = None;
        self.overflow = None;
        self.transition(SessionState::Selected);
        Ok(())
    }

    fn send_abort(&mut self) -> Result<()> {
        let po = self.po.as_ref().ok_or_else(|| Error::illegal_state("no PO selected"))?;
        session::abort_session(po.class()).execute(&mut self.po_reader)?;
        Ok(())
    }

    /// Run a step that talks to the cards, failing the transaction on any error
    ///
    /// Argument and state checks happen before the step, so an error out of it
    /// means the card side may already have moved.
    fn guard<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = step(self);
        if let Err(error) = &result {
            warn!(%error, state = %self.state, "Secure session failed");
            self.transition(SessionState::Failed);
        }
        result
    }

    fn transition(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "Session state");
            self.state = state;
        }
    }

    fn ensure_not_in_session(&self, action: &str) -> Result<()> {
        match self.state {
            SessionState::SessionOpen | SessionState::SessionClosing => Err(self.illegal(action)),
            _ => Ok(()),
        }
    }

    fn illegal(&self, action: &str) -> Error {
        Error::illegal_state(format!("cannot {action} in state {}", self.state))
    }

    fn open_session_ref(&self) -> Result<&OpenSession> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::illegal_state("no session open"))
    }

    /// Current state
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Selected PO
    pub const fn po(&self) -> Option<&CalypsoPo> {
        self.po.as_ref()
    }

    /// Security settings
    pub const fn settings(&self) -> &SecuritySettings {
        &self.settings
    }

    /// Data of the session currently open
    pub fn secure_session(&self) -> Option<&SecureSession> {
        self.session.as_ref().map(|session| &session.secure_session)
    }

    /// Modification buffer of the session currently open
    pub fn modification_buffer(&self) -> Option<&ModificationBuffer> {
        self.session.as_ref().map(|session| &session.buffer)
    }

    /// Session digest
    pub const fn digest(&self) -> &DigestAccumulator {
        &self.digest
    }

    /// Number of sub-sessions opened since the last call to `open_session`
    pub fn sub_session_count(&self) -> usize {
        self.sub_sessions.len()
    }

    /// Commands sent in each sub-session since the last call to `open_session`
    pub fn sub_sessions(&self) -> &[Vec<CalypsoApdu>] {
        &self.sub_sessions
    }

    /// Release the PO and SAM transports
    pub fn into_transports(self) -> (P, S) {
        (self.po_reader, self.sam_reader)
    }
}
