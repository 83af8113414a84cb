mod common;

use common::*;
use hex_literal::hex;
use keyple_calypso::commands::po::{self, ReadMode};
use keyple_calypso::{
    AccessLevel, CalypsoApdu, CalypsoPo, CommandKind, DigestUpdateMode, Error, PoClass, PoRevision, PoTransaction,
    RatificationMode, SamRevision, SecuritySettings, SessionState, TransmissionMode,
};
use keyple_core::{Command, Response};
use keyple_stub::StubPoConfig;

#[test]
fn test_session_commits_modifications() {
    init_tracing();
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());
    assert_eq!(transaction.po().unwrap().revision(), PoRevision::Rev3_1);
    assert_eq!(transaction.state(), SessionState::Selected);

    let session = transaction.open_session(AccessLevel::Debit, EVENT_LOG_SFI, 1).unwrap();
    assert_eq!(session.original_data.as_ref(), [0x11; 29]);
    assert!(session.previous_session_ratified);
    assert_eq!((session.kif, session.kvc), (0x30, 0x79));
    assert_eq!(session.challenge_transaction_counter, hex!("03D31C"));

    let class = PoClass::Iso;
    let responses = transaction
        .execute_commands(vec![
            po::read_records(class, EVENT_LOG_SFI, 2, ReadMode::OneRecord, 0).unwrap(),
            po::append_record(class, EVENT_LOG_SFI, vec![0xAB; 29]).unwrap(),
            po::decrease(class, COUNTERS_SFI, 1, 30).unwrap(),
        ])
        .unwrap();
    assert_eq!(responses[0].payload(), [0x22; 29]);
    assert_eq!(po::parse_counter_value(responses[2].payload()).unwrap(), 70);
    assert_eq!(transaction.modification_buffer().unwrap().used(), 35 + 9);

    let outcome = transaction.close_session().unwrap();
    assert_eq!(outcome.sub_session_count(), 1);
    assert_eq!(outcome.commands().count(), 3);
    assert!(outcome.postponed_data.is_empty());
    assert_eq!(transaction.state(), SessionState::Closed);
    assert!(transaction.secure_session().is_none());
    drop(transaction);

    let card = po_reader.card().unwrap();
    assert_eq!(card.record(EVENT_LOG_SFI, 1), Some(&[0xAB; 29][..]));
    assert_eq!(card.record(EVENT_LOG_SFI, 3), Some(&[0x22; 29][..]));
    assert_eq!(card.counter(COUNTERS_SFI, 1), Some(70));
    assert_eq!(card.sessions_committed(), 1);
    assert_eq!(card.transaction_counter(), 0x03_D31B);
    assert!(card.is_ratified());
}

#[test]
fn test_sessions_chain_after_close() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());

    for _ in 0..3 {
        transaction.open_session(AccessLevel::Load, 0, 0).unwrap();
        transaction
            .execute_commands(vec![po::increase(PoClass::Iso, COUNTERS_SFI, 2, 10).unwrap()])
            .unwrap();
        transaction.close_session().unwrap();
    }
    drop(transaction);

    let card = po_reader.card().unwrap();
    assert_eq!(card.counter(COUNTERS_SFI, 2), Some(35));
    assert_eq!(card.sessions_committed(), 3);
}

#[test]
fn test_multiple_digest_updates() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let settings = SecuritySettings::new().with_digest_update_mode(DigestUpdateMode::Multiple);
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, settings);

    transaction.open_session(AccessLevel::Debit, EVENT_LOG_SFI, 1).unwrap();
    transaction
        .execute_commands(vec![
            po::read_records(PoClass::Iso, EVENT_LOG_SFI, 1, ReadMode::MultipleRecords, 0).unwrap(),
            po::update_record(PoClass::Iso, EVENT_LOG_SFI, 3, vec![0x01, 0x02, 0x03]).unwrap(),
            po::write_record(PoClass::Iso, EVENT_LOG_SFI, 2, vec![0x40, 0x40]).unwrap(),
        ])
        .unwrap();
    assert_eq!(transaction.digest().pending(), 0);
    transaction.close_session().unwrap();
    drop(transaction);

    let card = po_reader.card().unwrap();
    assert_eq!(card.record(EVENT_LOG_SFI, 3), Some(&hex!("010203")[..]));
    assert_eq!(card.record(EVENT_LOG_SFI, 2).unwrap()[..3], [0x62, 0x62, 0x22]);
}

#[test]
fn test_encrypted_session() {
    for mode in [DigestUpdateMode::Single, DigestUpdateMode::Multiple] {
        let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
        let mut sam_reader = sam_reader();
        let settings = SecuritySettings::new()
            .with_encrypted_session(true)
            .with_digest_update_mode(mode);
        let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, settings);

        transaction.open_session(AccessLevel::Debit, EVENT_LOG_SFI, 1).unwrap();
        assert!(transaction.digest().is_encrypted());
        transaction
            .execute_commands(vec![
                po::read_records(PoClass::Iso, EVENT_LOG_SFI, 2, ReadMode::OneRecord, 0).unwrap(),
                po::decrease(PoClass::Iso, COUNTERS_SFI, 1, 10).unwrap(),
            ])
            .unwrap();
        transaction.close_session().unwrap();
        assert_eq!(transaction.state(), SessionState::Closed);
        drop(transaction);

        let card = po_reader.card().unwrap();
        assert_eq!(card.counter(COUNTERS_SFI, 1), Some(90), "{mode:?}");
        assert_eq!(card.sessions_committed(), 1);
    }
}

#[test]
fn test_abort_rolls_back() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());

    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();
    transaction
        .execute_commands(vec![po::decrease(PoClass::Iso, COUNTERS_SFI, 1, 100).unwrap()])
        .unwrap();
    transaction.abort_session().unwrap();
    assert_eq!(transaction.state(), SessionState::Selected);
    assert!(transaction.abort_session().unwrap_err().to_string().contains("SELECTED"));
    drop(transaction);

    let card = po_reader.card().unwrap();
    assert!(!card.is_session_open());
    assert_eq!(card.counter(COUNTERS_SFI, 1), Some(100));
    assert_eq!(card.sessions_committed(), 0);
}

#[test]
fn test_tampered_response_fails_authentication() {
    init_tracing();
    let mut po_reader = TamperingTransport::new(po_reader(stub_po(StubPoConfig::default())), 0xB2);
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());

    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();
    transaction
        .execute_commands(vec![
            po::read_records(PoClass::Iso, EVENT_LOG_SFI, 1, ReadMode::OneRecord, 0).unwrap(),
            po::append_record(PoClass::Iso, EVENT_LOG_SFI, vec![0xAB; 4]).unwrap(),
        ])
        .unwrap();

    let error = transaction.close_session().unwrap_err();
    assert!(error.is_authentication_failure(), "{error}");
    assert_eq!(error.status_word().unwrap().to_u16(), 0x6988);
    assert_eq!(transaction.state(), SessionState::Failed);
    drop(transaction);

    assert_eq!(po_reader.tampered(), 1);
    let po_reader = po_reader.into_inner();
    let card = po_reader.card().unwrap();
    assert_eq!(card.record(EVENT_LOG_SFI, 1), Some(&[0x11; 29][..]));
    assert_eq!(card.sessions_rejected(), 1);
}

#[test]
fn test_unauthorized_kvc_aborts() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let settings = SecuritySettings::new().with_authorized_kvcs([0x7E]);
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, settings);

    let error = transaction.open_session(AccessLevel::Debit, 0, 0).unwrap_err();
    assert!(matches!(error, Error::UnauthorizedKvc(0x79)));
    assert_eq!(transaction.state(), SessionState::Selected);
    drop(transaction);
    assert!(!po_reader.card().unwrap().is_session_open());
}

#[test]
fn test_contactless_ratification() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let settings = SecuritySettings::new().with_ratification_mode(RatificationMode::CloseNotRatified);
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, settings);

    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();
    transaction.close_session().unwrap();
    drop(transaction);
    assert!(po_reader.card().unwrap().is_ratified());
}

#[test]
fn test_unratified_session_reported_at_next_opening() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let settings = SecuritySettings::new()
        .with_ratification_mode(RatificationMode::CloseNotRatified)
        .with_transmission_mode(TransmissionMode::Contacts);
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, settings);

    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();
    transaction.close_session().unwrap();

    let session = transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();
    assert!(!session.previous_session_ratified);
    transaction.abort_session().unwrap();
}

#[test]
fn test_rev24_session() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default().with_application_type(0x06)));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());
    assert_eq!(transaction.po().unwrap().revision(), PoRevision::Rev2_4);

    let session = transaction.open_session(AccessLevel::Debit, EVENT_LOG_SFI, 2).unwrap();
    assert_eq!(session.kif, 0xFF);
    assert_eq!(session.kvc, 0x79);
    assert_eq!(session.original_data.as_ref(), [0x22; 29]);

    transaction
        .execute_commands(vec![po::update_record(PoClass::Legacy, EVENT_LOG_SFI, 2, vec![0x01, 0x02, 0x03]).unwrap()])
        .unwrap();
    assert_eq!(transaction.modification_buffer().unwrap().remaining(), 5);
    transaction.close_session().unwrap();
    drop(transaction);

    assert_eq!(po_reader.card().unwrap().record(EVENT_LOG_SFI, 2), Some(&hex!("010203")[..]));
}

#[test]
fn test_rev32_session() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default().with_application_type(0x28)));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());
    assert_eq!(transaction.po().unwrap().revision(), PoRevision::Rev3_2);

    let session = transaction.open_session(AccessLevel::Load, 0, 0).unwrap();
    assert_eq!(session.challenge_random_number.len(), 5);
    assert!(session.manage_secure_session_authorized);
    assert_eq!(session.kif, 0x27);

    transaction
        .execute_commands(vec![po::increase(PoClass::Iso, COUNTERS_SFI, 2, 10).unwrap()])
        .unwrap();
    transaction.close_session().unwrap();
    drop(transaction);

    assert_eq!(po_reader.card().unwrap().counter(COUNTERS_SFI, 2), Some(15));
}

#[test]
fn test_invalidated_df_is_selected() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default().with_df_invalidated(true)));
    let mut sam_reader = sam_reader();
    let transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());
    assert!(transaction.po().unwrap().is_df_invalidated());
}

#[test]
fn test_unknown_application() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let mut transaction =
        PoTransaction::new(&mut po_reader, &mut sam_reader, SamRevision::C1, SecuritySettings::new()).unwrap();

    let error = transaction.select_application(b"2TIC.ICA").unwrap_err();
    assert_eq!(error.status_word().unwrap().to_u16(), 0x6A82);
    assert_eq!(transaction.state(), SessionState::Idle);
    assert!(transaction.po().is_none());
}

#[test]
fn test_operations_out_of_order() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let mut transaction =
        PoTransaction::new(&mut po_reader, &mut sam_reader, SamRevision::C1, SecuritySettings::new()).unwrap();

    assert!(matches!(
        transaction.open_session(AccessLevel::Debit, 0, 0),
        Err(Error::IllegalState(_))
    ));
    assert!(matches!(transaction.execute_commands(Vec::new()), Err(Error::IllegalState(_))));
    assert!(matches!(transaction.close_session(), Err(Error::IllegalState(_))));

    transaction.select_application(AID).unwrap();
    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();
    assert!(matches!(transaction.select_application(AID), Err(Error::IllegalState(_))));
    assert!(transaction.open_session(AccessLevel::Debit, 0, 0).is_err());
    assert_eq!(transaction.state(), SessionState::SessionOpen);
}

#[test]
fn test_auto_sam_revision_rejected() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let error = PoTransaction::new(&mut po_reader, &mut sam_reader, SamRevision::Auto, SecuritySettings::new())
        .unwrap_err();
    assert!(error.is_argument());
}

#[test]
fn test_transaction_counter_exhausted() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default().with_transaction_counter(0)));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());

    let error = transaction.open_session(AccessLevel::Debit, 0, 0).unwrap_err();
    assert_eq!(error.status_word().unwrap().to_u16(), 0x6900);
    assert_eq!(transaction.state(), SessionState::Failed);
}

#[test]
fn test_transport_failure_fails_session() {
    let config = StubPoConfig::default();
    let mut fci = config.fci();
    fci.extend_from_slice(&hex!("9000"));
    let po = CalypsoPo::from_fci(&Response::from_bytes(&fci).unwrap(), &[]).unwrap();

    // Card inserted, channel never opened
    let mut po_reader = common::PoReader::new("po-reader");
    po_reader.insert_card(stub_po(config)).unwrap();
    let mut sam_reader = sam_reader();
    let mut transaction =
        PoTransaction::new(&mut po_reader, &mut sam_reader, SamRevision::C1, SecuritySettings::new()).unwrap();
    transaction.with_selected_po(po).unwrap();

    let error = transaction.open_session(AccessLevel::Debit, 0, 0).unwrap_err();
    assert!(error.is_transport(), "{error}");
    assert_eq!(transaction.state(), SessionState::Failed);
}

#[test]
fn test_command_beyond_digest_block_not_sent() {
    let mut po_reader = po_reader(stub_po(StubPoConfig::default()));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());
    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();

    // 5 byte header and 251 bytes of data
    let command = Command::new_with_data(0x00, 0xE2, 0x00, EVENT_LOG_SFI * 8, vec![0x5A; 251]).unwrap();
    let oversized = CalypsoApdu::new(command, CommandKind::AppendRecord);
    let error = transaction
        .execute_commands(vec![po::read_records(PoClass::Iso, EVENT_LOG_SFI, 1, ReadMode::OneRecord, 0).unwrap(), oversized])
        .unwrap_err();
    assert!(error.is_argument(), "{error}");
    assert_eq!(transaction.state(), SessionState::SessionOpen);

    transaction
        .execute_commands(vec![po::append_record(PoClass::Iso, EVENT_LOG_SFI, vec![0xAB; 29]).unwrap()])
        .unwrap();
    transaction.close_session().unwrap();
    assert_eq!(transaction.state(), SessionState::Closed);
    drop(transaction);

    let card = po_reader.card().unwrap();
    assert_eq!(card.record(EVENT_LOG_SFI, 1), Some(&[0xAB; 29][..]));
    assert_eq!(card.record(EVENT_LOG_SFI, 2), Some(&[0x11; 29][..]));
    assert_eq!(card.sessions_committed(), 1);
}

#[test]
fn test_error_after_exchange_fails_session() {
    let mut po_reader = OversizedReadTransport::new(po_reader(stub_po(StubPoConfig::default())));
    let mut sam_reader = sam_reader();
    let mut transaction = selected_transaction(&mut po_reader, &mut sam_reader, SecuritySettings::new());
    transaction.open_session(AccessLevel::Debit, 0, 0).unwrap();

    // The PO answered, the digest cannot mirror the answer
    let error = transaction
        .execute_commands(vec![po::read_records(PoClass::Iso, EVENT_LOG_SFI, 1, ReadMode::OneRecord, 0).unwrap()])
        .unwrap_err();
    assert!(error.is_argument(), "{error}");
    assert_eq!(transaction.state(), SessionState::Failed);
    assert!(matches!(transaction.close_session(), Err(Error::IllegalState(_))));

    transaction.abort_session().unwrap();
    assert_eq!(transaction.state(), SessionState::Selected);
    drop(transaction);

    let po_reader = po_reader.into_inner();
    let card = po_reader.card().unwrap();
    assert!(!card.is_session_open());
    assert_eq!(card.sessions_committed(), 0);
}
