//! End-to-end session tests over an in-process duplex pipe: a real
//! originator and a real answerer, each with its own transfer batch,
//! exercised together with `tokio::join!`.

use std::time::Duration;

use binkp::options::OptionMode;
use binkp::{
    Error, FileToSend, OptionPrefs, Role, Session, SessionConfig, SessionOutcome, TransferBatch,
};
use ftn_dtyp::Address;
use tempfile::TempDir;

const FILE_SIZE: usize = 100_000;

fn originator_config(password: &str, options: OptionPrefs) -> SessionConfig {
    SessionConfig {
        addresses: vec![Address::new(2, 5020, 846)],
        system_name: "Origin Test".into(),
        sysop: "orig".into(),
        password: password.into(),
        options,
        idle_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

fn answerer_config(password: &str, options: OptionPrefs) -> SessionConfig {
    SessionConfig {
        addresses: vec![Address::new(2, 5020, 52)],
        system_name: "Answer Test".into(),
        sysop: "answ".into(),
        password: password.into(),
        options,
        idle_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// File content with enough texture to catch offset mistakes.
fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn run_pair(
    orig_config: SessionConfig,
    answ_config: SessionConfig,
    orig_batch: TransferBatch,
    answ_batch: TransferBatch,
) -> (
    binkp::Result<SessionOutcome>,
    binkp::Result<SessionOutcome>,
) {
    let (orig_stream, answ_stream) = tokio::io::duplex(256 * 1024);
    tokio::join!(
        Session::run(orig_stream, Role::Originator, orig_config, orig_batch),
        Session::run(answ_stream, Role::Answerer, answ_config, answ_batch),
    )
}

#[test_log::test(tokio::test)]
async fn cram_handshake_reaches_transfer() {
    let inbox = TempDir::new().unwrap();
    let (orig, answ) = run_pair(
        originator_config("hello", OptionPrefs::default()),
        answerer_config("hello", OptionPrefs::default()),
        TransferBatch::new(inbox.path().join("orig-in")),
        TransferBatch::new(inbox.path().join("answ-in")),
    )
    .await;

    let orig = orig.unwrap();
    let answ = answ.unwrap();
    assert!(orig.secure);
    assert!(answ.secure);
    assert_eq!(orig.remote_addresses, vec![Address::new(2, 5020, 52)]);
    assert_eq!(answ.remote_addresses, vec![Address::new(2, 5020, 846)]);
}

#[test_log::test(tokio::test)]
async fn single_file_no_options() {
    let spool = TempDir::new().unwrap();
    let content = patterned(FILE_SIZE);
    let out_path = spool.path().join("pkt.pkt");
    std::fs::write(&out_path, &content).unwrap();

    let off = OptionPrefs {
        nr: OptionMode::Off,
        crc: OptionMode::Off,
        plz: OptionMode::Off,
        ..Default::default()
    };
    let mut orig_batch = TransferBatch::new(spool.path().join("orig-in"));
    orig_batch.enqueue(FileToSend::from_path(&out_path).await.unwrap());
    let answ_inbox = spool.path().join("answ-in");
    let answ_batch = TransferBatch::new(&answ_inbox);

    let (orig, answ) = run_pair(
        originator_config("pw", off.clone()),
        answerer_config("pw", off),
        orig_batch,
        answ_batch,
    )
    .await;

    let orig = orig.unwrap();
    let answ = answ.unwrap();
    assert!(!orig.options.nr && !orig.options.crc && !orig.options.plz);
    assert_eq!(orig.sent.len(), 1);
    assert!(orig.received.is_empty());
    assert_eq!(answ.received, vec![answ_inbox.join("pkt.pkt")]);
    assert_eq!(std::fs::read(answ_inbox.join("pkt.pkt")).unwrap(), content);
    // Acknowledged files are removed from the sender's spool.
    assert!(!out_path.exists());
}

#[test_log::test(tokio::test)]
async fn bidirectional_transfer_with_crc_and_plz() {
    let spool = TempDir::new().unwrap();
    let a_content = patterned(70_000);
    let b_content = patterned(45_000);
    let a_path = spool.path().join("a.pkt");
    let b_path = spool.path().join("b.pkt");
    std::fs::write(&a_path, &a_content).unwrap();
    std::fs::write(&b_path, &b_content).unwrap();

    let mut orig_batch = TransferBatch::new(spool.path().join("orig-in"));
    orig_batch.enqueue(FileToSend::from_path(&a_path).await.unwrap());
    let mut answ_batch = TransferBatch::new(spool.path().join("answ-in"));
    answ_batch.enqueue(FileToSend::from_path(&b_path).await.unwrap());

    let (orig, answ) = run_pair(
        originator_config("pw", OptionPrefs::default()),
        answerer_config("pw", OptionPrefs::default()),
        orig_batch,
        answ_batch,
    )
    .await;

    let orig = orig.unwrap();
    let answ = answ.unwrap();
    assert!(orig.options.crc && orig.options.plz && orig.options.nr);
    assert_eq!(orig.options, answ.options);

    assert_eq!(
        std::fs::read(spool.path().join("answ-in/a.pkt")).unwrap(),
        a_content
    );
    assert_eq!(
        std::fs::read(spool.path().join("orig-in/b.pkt")).unwrap(),
        b_content
    );
    // PLZ was active, so compressed traffic is accounted for.
    assert!(orig.stats_out.plz_bytes_before > 0);
    assert!(orig.stats_out.plz_bytes_after < orig.stats_out.plz_bytes_before);
    assert_eq!(orig.stats_in.crc_failures, 0);
}

#[test_log::test(tokio::test)]
async fn resume_after_interruption_with_nr() {
    let spool = TempDir::new().unwrap();
    let content = patterned(FILE_SIZE);
    let out_path = spool.path().join("pkt.pkt");
    std::fs::write(&out_path, &content).unwrap();

    // A prior session left 60 000 bytes of temp file at the receiver.
    let answ_inbox = spool.path().join("answ-in");
    std::fs::create_dir_all(&answ_inbox).unwrap();
    std::fs::write(answ_inbox.join("pkt.pkt.bpt"), &content[..60_000]).unwrap();

    let mut orig_batch = TransferBatch::new(spool.path().join("orig-in"));
    orig_batch.enqueue(FileToSend::from_path(&out_path).await.unwrap());
    let answ_batch = TransferBatch::new(&answ_inbox);

    let (orig, answ) = run_pair(
        originator_config("pw", OptionPrefs::default()),
        answerer_config("pw", OptionPrefs::default()),
        orig_batch,
        answ_batch,
    )
    .await;

    let orig = orig.unwrap();
    let answ = answ.unwrap();
    assert!(orig.options.nr);
    assert_eq!(orig.sent.len(), 1);
    assert_eq!(answ.received, vec![answ_inbox.join("pkt.pkt")]);
    assert_eq!(std::fs::read(answ_inbox.join("pkt.pkt")).unwrap(), content);
    // At least the 40 000-byte tail flowed again.
    assert!(orig.stats_out.data_bytes >= 40_000);
}

#[test_log::test(tokio::test)]
async fn bad_password_aborts_before_transfer() {
    let spool = TempDir::new().unwrap();
    let out_path = spool.path().join("pkt.pkt");
    std::fs::write(&out_path, b"should never arrive").unwrap();
    let mut orig_batch = TransferBatch::new(spool.path().join("orig-in"));
    orig_batch.enqueue(FileToSend::from_path(&out_path).await.unwrap());

    let answ_inbox = spool.path().join("answ-in");
    let (orig, answ) = run_pair(
        originator_config("wrong", OptionPrefs::default()),
        answerer_config("right", OptionPrefs::default()),
        orig_batch,
        TransferBatch::new(&answ_inbox),
    )
    .await;

    assert!(matches!(orig, Err(Error::Remote(_))));
    assert!(matches!(answ, Err(Error::Auth(_))));
    assert!(out_path.exists());
    assert!(!answ_inbox.join("pkt.pkt").exists());
}

#[test_log::test(tokio::test)]
async fn required_option_peer_lacks_aborts_session() {
    let inbox = TempDir::new().unwrap();
    let demanding = OptionPrefs {
        crc: OptionMode::Required,
        ..Default::default()
    };
    let lacking = OptionPrefs {
        crc: OptionMode::Off,
        ..Default::default()
    };

    let (orig, answ) = run_pair(
        originator_config("pw", demanding),
        answerer_config("pw", lacking),
        TransferBatch::new(inbox.path().join("orig-in")),
        TransferBatch::new(inbox.path().join("answ-in")),
    )
    .await;

    assert!(matches!(orig, Err(Error::OptionRequired("CRC"))));
    // The answerer either sees our M_ERR or the closed pipe.
    assert!(answ.is_err());
}

#[test_log::test(tokio::test)]
async fn plaintext_password_requires_mutual_consent() {
    let inbox = TempDir::new().unwrap();

    // The answerer has no password configured, so it offers no CRAM;
    // the originator refuses to send its secret in the clear.
    let mut orig_config = originator_config("secret", OptionPrefs::default());
    orig_config.allow_plain_password = false;
    let answ_config = answerer_config("", OptionPrefs::default());

    let (orig, _answ) = run_pair(
        orig_config,
        answ_config,
        TransferBatch::new(inbox.path().join("orig-in")),
        TransferBatch::new(inbox.path().join("answ-in")),
    )
    .await;
    assert!(matches!(orig, Err(Error::Auth(_))));

    // Consent flags never downgrade a link where CRAM is available.
    let mut orig_config = originator_config("secret", OptionPrefs::default());
    orig_config.allow_plain_password = true;
    let mut answ_config = answerer_config("secret", OptionPrefs::default());
    answ_config.allow_plain_password = true;
    let (orig, answ) = run_pair(
        orig_config,
        answ_config,
        TransferBatch::new(inbox.path().join("orig-in2")),
        TransferBatch::new(inbox.path().join("answ-in2")),
    )
    .await;
    assert!(orig.unwrap().secure);
    assert!(answ.unwrap().secure);
}

#[test_log::test(tokio::test)]
async fn silent_peer_trips_idle_timeout() {
    let (stream, quiet_end) = tokio::io::duplex(16 * 1024);
    let inbox = TempDir::new().unwrap();
    let mut config = answerer_config("pw", OptionPrefs::default());
    config.idle_timeout = Duration::from_millis(200);

    let result = Session::run(
        stream,
        Role::Answerer,
        config,
        TransferBatch::new(inbox.path()),
    )
    .await;
    assert!(matches!(result, Err(Error::IdleTimeout)));
    drop(quiet_end);
}
