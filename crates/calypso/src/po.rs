//! Calypso PO card model built from the selection FCI
//!
//! ```text
//! 6F  FCI template
//!   84  DF name
//!   A5  proprietary template
//!     BF0C  issuer discretionary data
//!       C7  application serial number (8 bytes)
//!       53  discretionary data: startup information (7 bytes)
//! ```

use iso7816_tlv::ber::{Tlv, Value};
use keyple_core::selection::SelectionResponse;
use keyple_core::{Bytes, Response};
use tracing::debug;

use crate::buffer::{BufferCapacity, REV2_4_MODIFICATIONS};
use crate::revision::{OpenSessionVariant, PoClass, PoRevision};
use crate::{Error, Result};

const TAG_FCI_TEMPLATE: &[u8] = &[0x6F];
const TAG_DF_NAME: &[u8] = &[0x84];
const TAG_PROPRIETARY_TEMPLATE: &[u8] = &[0xA5];
const TAG_ISSUER_DISCRETIONARY_DATA: &[u8] = &[0xBF, 0x0C];
const TAG_APPLICATION_SERIAL_NUMBER: &[u8] = &[0xC7];
const TAG_DISCRETIONARY_DATA: &[u8] = &[0x53];

/// Status word of a selection on an invalidated DF
const DF_INVALIDATED: u16 = 0x6283;

/// Startup information from the FCI discretionary data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupInfo {
    /// Modification buffer size indicator
    pub buffer_size_indicator: u8,
    /// Chip platform
    pub platform: u8,
    /// Application type
    pub application_type: u8,
    /// Application subtype
    pub application_subtype: u8,
    /// Software issuer
    pub software_issuer: u8,
    /// Software version
    pub software_version: u8,
    /// Software revision
    pub software_revision: u8,
}

impl StartupInfo {
    /// Decode the 7 byte startup information
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [indicator, platform, app_type, app_subtype, issuer, version, revision, ..] => Ok(Self {
                buffer_size_indicator: *indicator,
                platform: *platform,
                application_type: *app_type,
                application_subtype: *app_subtype,
                software_issuer: *issuer,
                software_version: *version,
                software_revision: *revision,
            }),
            _ => Err(Error::Parse("startup information shorter than 7 bytes")),
        }
    }
}

/// A selected Calypso PO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalypsoPo {
    atr: Bytes,
    df_name: Bytes,
    serial_number: Bytes,
    startup_info: StartupInfo,
    revision: PoRevision,
    modification_buffer: BufferCapacity,
    df_invalidated: bool,
}

impl CalypsoPo {
    /// Build the PO from the Select Application response
    pub fn from_fci(fci: &Response, atr: &[u8]) -> Result<Self> {
        if fci.payload().is_empty() {
            return Err(Error::MissingFci);
        }
        let template = Tlv::from_bytes(fci.payload()).map_err(|_| Error::Parse("malformed FCI"))?;
        if template.tag().to_bytes() != TAG_FCI_TEMPLATE {
            return Err(Error::Parse("FCI template tag is not 6F"));
        }

        let df_name = find_primitive(&template, &[TAG_DF_NAME])?;
        let serial_number = find_primitive(
            &template,
            &[TAG_PROPRIETARY_TEMPLATE, TAG_ISSUER_DISCRETIONARY_DATA, TAG_APPLICATION_SERIAL_NUMBER],
        )?;
        let startup = find_primitive(
            &template,
            &[TAG_PROPRIETARY_TEMPLATE, TAG_ISSUER_DISCRETIONARY_DATA, TAG_DISCRETIONARY_DATA],
        )?;

        if serial_number.len() != 8 {
            return Err(Error::Parse("application serial number is not 8 bytes"));
        }
        let startup_info = StartupInfo::from_bytes(startup)?;
        let revision = PoRevision::from_application_type(startup_info.application_type);
        let modification_buffer = match revision {
            PoRevision::Rev1_0 | PoRevision::Rev2_4 => BufferCapacity::Operations(REV2_4_MODIFICATIONS),
            _ => BufferCapacity::from_indicator(startup_info.buffer_size_indicator)?,
        };
        let df_invalidated = fci.status().to_u16() == DF_INVALIDATED;

        debug!(
            serial = %hex::encode_upper(serial_number),
            %revision,
            ?modification_buffer,
            df_invalidated,
            "Calypso PO identified"
        );

        Ok(Self {
            atr: Bytes::copy_from_slice(atr),
            df_name: Bytes::copy_from_slice(df_name),
            serial_number: Bytes::copy_from_slice(serial_number),
            startup_info,
            revision,
            modification_buffer,
            df_invalidated,
        })
    }

    /// Build the PO from a matching selection
    pub fn from_selection(response: &SelectionResponse) -> Result<Self> {
        let fci = response.fci.as_ref().ok_or(Error::MissingFci)?;
        Self::from_fci(fci, response.atr_bytes())
    }

    /// ATR of the card
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Name of the selected DF
    pub fn df_name(&self) -> &[u8] {
        &self.df_name
    }

    /// Application serial number, also the SAM key diversifier
    pub fn serial_number(&self) -> &[u8] {
        &self.serial_number
    }

    /// Startup information
    pub const fn startup_info(&self) -> &StartupInfo {
        &self.startup_info
    }

    /// PO revision
    pub const fn revision(&self) -> PoRevision {
        self.revision
    }

    /// Class byte of PO commands
    pub const fn class(&self) -> PoClass {
        self.revision.class()
    }

    /// Open Session layout
    pub const fn open_session_variant(&self) -> OpenSessionVariant {
        self.revision.open_session_variant()
    }

    /// Modification buffer capacity
    pub const fn modification_buffer(&self) -> BufferCapacity {
        self.modification_buffer
    }

    /// Returns true if the DF was selected while invalidated
    pub const fn is_df_invalidated(&self) -> bool {
        self.df_invalidated
    }
}

/// Follow a path of constructed tags down to a primitive value
fn find_primitive<'a>(tlv: &'a Tlv, path: &[&[u8]]) -> Result<&'a [u8]> {
    let Value::Constructed(children) = tlv.value() else {
        return Err(Error::Parse("expected constructed FCI element"));
    };
    let (head, rest) = path.split_first().ok_or(Error::Parse("empty FCI path"))?;
    let child = children
        .iter()
        .find(|child| child.tag().to_bytes() == *head)
        .ok_or(Error::Parse("FCI element missing"))?;

    if rest.is_empty() {
        match child.value() {
            Value::Primitive(bytes) => Ok(bytes),
            Value::Constructed(_) => Err(Error::Parse("expected primitive FCI element")),
        }
    } else {
        find_primitive(child, rest)
    }
}
