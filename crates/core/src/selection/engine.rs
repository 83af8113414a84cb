//! Card selection engine
//!
//! Runs prepared selection cases in registration order against a reader and
//! aggregates the matching ones into a [`SelectionResult`].

use bytes::Bytes;
use tracing::{debug, trace};

use super::request::{CardSelectionRequest, SelectionResponse};
use super::result::SelectionResult;
use super::{ChannelControl, MultiSelectionProcessing};
use crate::response::table::StatusTable;
use crate::transport::ReaderChannel;
use crate::Result;

/// Ordered set of selection cases and the policy applied to them
#[derive(Debug)]
pub struct CardSelection<R> {
    requests: Vec<R>,
    multi_selection: MultiSelectionProcessing,
    channel_control: ChannelControl,
}

impl<R: CardSelectionRequest> Default for CardSelection<R> {
    fn default() -> Self {
        Self::new(MultiSelectionProcessing::default(), ChannelControl::default())
    }
}

impl<R: CardSelectionRequest> CardSelection<R> {
    /// Create an empty selection
    pub const fn new(multi_selection: MultiSelectionProcessing, channel_control: ChannelControl) -> Self {
        Self {
            requests: Vec::new(),
            multi_selection,
            channel_control,
        }
    }

    /// Register a selection case, returning its index
    pub fn prepare_selection(&mut self, request: R) -> usize {
        self.requests.push(request);
        let index = self.requests.len() - 1;
        trace!(index, "Prepared selection case");
        index
    }

    /// Registered selection cases
    pub fn requests(&self) -> &[R] {
        &self.requests
    }

    /// Multi-selection policy
    pub const fn multi_selection(&self) -> MultiSelectionProcessing {
        self.multi_selection
    }

    /// Channel policy applied once the selection is done
    pub const fn channel_control(&self) -> ChannelControl {
        self.channel_control
    }

    /// Run every case against the reader and build the result
    pub fn process_explicit_selection<T>(&self, reader: &mut T) -> std::result::Result<SelectionResult<R::Card>, R::Error>
    where
        T: ReaderChannel + ?Sized,
    {
        let responses = self.transmit_selections(reader)?;
        self.process_default_selection(responses)
    }

    /// Build the result from responses obtained beforehand
    ///
    /// `None` entries and non-matching cases produce no card.
    pub fn process_default_selection(
        &self,
        responses: Vec<Option<SelectionResponse>>,
    ) -> std::result::Result<SelectionResult<R::Card>, R::Error> {
        let mut result = SelectionResult::new();

        for (index, response) in responses.into_iter().enumerate() {
            let Some(response) = response.filter(|response| response.has_matched) else {
                continue;
            };
            let Some(request) = self.requests.get(index) else {
                return Err(crate::Error::selection(format!("no selection case at index {index}")).into());
            };
            let card = request.parse(&response)?;
            debug!(index, active = response.logical_channel_open, "Selection case matched");
            result.add_card(index, card, response.logical_channel_open);
        }

        Ok(result)
    }

    /// Send the selection commands of every case and collect the raw outcomes
    ///
    /// Cases skipped after a first match yield `None`.
    pub fn transmit_selections<T>(&self, reader: &mut T) -> Result<Vec<Option<SelectionResponse>>>
    where
        T: ReaderChannel + ?Sized,
    {
        let mut responses: Vec<Option<SelectionResponse>> = Vec::with_capacity(self.requests.len());
        let last = self.requests.len().saturating_sub(1);

        for (index, request) in self.requests.iter().enumerate() {
            if !reader.is_physical_channel_open() {
                reader.open_physical_channel()?;
            }

            let response = Self::select(reader, request)?;
            let matched = response.has_matched;
            responses.push(Some(response));

            match self.multi_selection {
                MultiSelectionProcessing::FirstMatch if matched => break,
                MultiSelectionProcessing::ProcessAll if index < last => {
                    // Next case starts from a fresh channel
                    if let Some(Some(response)) = responses.last_mut() {
                        response.logical_channel_open = false;
                    }
                    reader.close_physical_channel()?;
                }
                _ => {}
            }
        }
        responses.resize(self.requests.len(), None);

        if self.channel_control == ChannelControl::CloseAfter && reader.is_physical_channel_open() {
            for response in responses.iter_mut().flatten() {
                response.logical_channel_open = false;
            }
            reader.close_physical_channel()?;
        }

        Ok(responses)
    }

    fn select<T>(reader: &mut T, request: &R) -> Result<SelectionResponse>
    where
        T: ReaderChannel + ?Sized,
    {
        let selector = request.selector();
        let atr = reader.atr().map(Bytes::copy_from_slice);

        if !selector.matches_card(atr.as_deref().unwrap_or_default(), reader.current_protocol()) {
            trace!(atr = ?atr.as_deref().map(hex::encode_upper), "Card does not match protocol or ATR filter");
            return Ok(SelectionResponse::not_matched(atr, None));
        }

        let fci = match selector.aid_selector() {
            Some(aid_selector) => {
                let fci = reader.transmit(&aid_selector.select_command()?)?;
                let accepted = StatusTable::EMPTY
                    .classify_with_alternates(fci.status(), aid_selector.successful_status_codes())
                    .successful;
                if !accepted {
                    trace!(aid = %hex::encode_upper(aid_selector.aid()), status = %fci.status(), "Application not selected");
                    return Ok(SelectionResponse::not_matched(atr, Some(fci)));
                }
                Some(fci)
            }
            None => None,
        };

        let responses = request
            .commands()
            .iter()
            .map(|command| reader.transmit(command))
            .collect::<Result<Vec<_>>>()?;

        Ok(SelectionResponse {
            atr,
            fci,
            has_matched: true,
            logical_channel_open: true,
            responses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::request::GenericSelectionRequest;
    use crate::selection::selector::{AidSelector, CardSelector};
    use crate::transport::MockTransport;
    use hex_literal::hex;

    fn aid_request(aid: &[u8]) -> GenericSelectionRequest {
        GenericSelectionRequest::new(
            CardSelector::new().with_aid_selector(AidSelector::new(aid.to_vec()).unwrap()),
        )
    }

    fn reader(responses: &[&[u8]]) -> MockTransport {
        let mut reader = MockTransport::new(responses.iter().map(|r| Bytes::copy_from_slice(r)).collect());
        reader.atr = hex!("3B8880010000000000718100F9").to_vec();
        reader
    }

    #[test]
    fn test_first_match_stops_at_first_matching_case() {
        let mut selection = CardSelection::new(MultiSelectionProcessing::FirstMatch, ChannelControl::KeepOpen);
        let a = selection.prepare_selection(aid_request(&hex!("A000000001")));
        let b = selection.prepare_selection(aid_request(&hex!("A000000002")));
        let c = selection.prepare_selection(aid_request(&hex!("A000000003")));

        let mut reader = reader(&[&hex!("6A82"), &hex!("6F009000")]);
        let result = selection.process_explicit_selection(&mut reader).unwrap();

        assert_eq!(result.active_index(), Some(b));
        assert!(!result.has_matched(a));
        assert!(!result.has_matched(c));
        assert_eq!(result.active_card().unwrap().fci.as_ref(), hex!("6F00"));
        assert_eq!(reader.commands.len(), 2);
        assert!(reader.open);
    }

    #[test]
    fn test_process_all_keeps_only_last_channel() {
        let mut selection = CardSelection::new(MultiSelectionProcessing::ProcessAll, ChannelControl::KeepOpen);
        selection.prepare_selection(aid_request(&hex!("A000000001")));
        selection.prepare_selection(aid_request(&hex!("A000000002")));
        selection.prepare_selection(aid_request(&hex!("A000000003")));

        let mut reader = reader(&[&hex!("9000"), &hex!("6A82"), &hex!("9000")]);
        let result = selection.process_explicit_selection(&mut reader).unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.has_matched(0));
        assert!(!result.has_matched(1));
        assert_eq!(result.active_index(), Some(2));
        assert_eq!(reader.closes, 2);
    }

    #[test]
    fn test_close_after_leaves_no_active_selection() {
        let mut selection = CardSelection::new(MultiSelectionProcessing::FirstMatch, ChannelControl::CloseAfter);
        selection.prepare_selection(aid_request(&hex!("A000000001")));

        let mut reader = reader(&[&hex!("9000")]);
        let result = selection.process_explicit_selection(&mut reader).unwrap();

        assert!(result.has_matched(0));
        assert!(!result.has_active_selection());
        assert!(!reader.open);
    }

    #[test]
    fn test_alternate_status_and_atr_filter() {
        let mut selection = CardSelection::new(MultiSelectionProcessing::ProcessAll, ChannelControl::KeepOpen);
        selection.prepare_selection(GenericSelectionRequest::new(
            CardSelector::new().with_atr_filter("3B88.*").unwrap(),
        ));
        selection.prepare_selection(GenericSelectionRequest::new(
            CardSelector::new().with_atr_filter("3B8F.*").unwrap(),
        ));
        selection.prepare_selection(GenericSelectionRequest::new(
            CardSelector::new().with_aid_selector(
                AidSelector::new(hex!("A000000001").to_vec())
                    .unwrap()
                    .with_successful_status_code(0x6283),
            ),
        ));

        let mut reader = reader(&[&hex!("6283")]);
        let result = selection.process_explicit_selection(&mut reader).unwrap();

        assert!(result.has_matched(0));
        assert!(!result.has_matched(1));
        assert!(result.has_matched(2));
        assert_eq!(reader.commands.len(), 1);
    }

    #[test]
    fn test_extra_commands_after_selection() {
        let mut selection = CardSelection::default();
        selection.prepare_selection(
            aid_request(&hex!("A000000001")).with_command(crate::Command::new_with_le(0x00, 0xB2, 0x01, 0x0C, 0)),
        );

        let mut reader = reader(&[&hex!("9000"), &hex!("01029000")]);
        let result = selection.process_explicit_selection(&mut reader).unwrap();
        let card = result.active_card().unwrap();
        assert_eq!(card.responses[0].payload(), &hex!("0102"));
    }

    #[test]
    fn test_default_selection_from_precomputed_responses() {
        let mut selection = CardSelection::<GenericSelectionRequest>::default();
        selection.prepare_selection(aid_request(&hex!("A000000001")));
        selection.prepare_selection(aid_request(&hex!("A000000002")));

        let responses = vec![
            None,
            Some(SelectionResponse {
                has_matched: true,
                logical_channel_open: true,
                ..Default::default()
            }),
        ];
        let result = selection.process_default_selection(responses).unwrap();
        assert_eq!(result.active_index(), Some(1));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_transport_error_aborts_selection() {
        let mut selection = CardSelection::<GenericSelectionRequest>::default();
        selection.prepare_selection(aid_request(&hex!("A000000001")));

        let mut reader = reader(&[]);
        assert!(selection.process_explicit_selection(&mut reader).unwrap_err().is_transport());
    }
}
