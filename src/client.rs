use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::config::{IdentityStore, TransferInfo, ME_INFO_FILE, TRANSFER_INFO_FILE};
use crate::crypto::{Crypto, RsaAesCrypto};
use crate::error::Result;
use crate::network::{self, Connection};
use crate::session::Session;
use crate::transfer::{self, TransferOptions, TransferReport};

/// Where the client finds its files and how it uploads
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transfer_info: PathBuf,
    pub me_info: PathBuf,
    pub transfer: TransferOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transfer_info: PathBuf::from(TRANSFER_INFO_FILE),
            me_info: PathBuf::from(ME_INFO_FILE),
            transfer: TransferOptions::default(),
        }
    }
}

/// One full backup run: read config, connect, handshake, upload, disconnect
pub async fn run(config: &ClientConfig) -> Result<TransferReport> {
    let info = TransferInfo::read(&config.transfer_info)?;
    let mut session = open_session(&info, &config.transfer_info, &config.me_info)?;

    let mut conn = network::connect(&info.host, info.port).await?;
    info!("Connected to {}", conn.peer());

    let result = backup(&mut conn, &mut session, &info.file_path, &config.transfer).await;
    conn.close().await;
    result
}

/// Handshake, then upload `file` on an open connection
pub async fn backup<S, C>(
    conn: &mut Connection<S>,
    session: &mut Session<C>,
    file: &Path,
    options: &TransferOptions,
) -> Result<TransferReport>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Crypto,
{
    session.establish(conn).await?;
    transfer::send_file(conn, session, file, options).await
}

fn open_session(
    info: &TransferInfo,
    transfer_info: &Path,
    me_info: &Path,
) -> Result<Session<RsaAesCrypto>> {
    let store = IdentityStore::new(me_info);
    if !store.exists() {
        info!(name = %info.name, "No saved identity, this client will register");
        return Ok(Session::new(info.name.clone(), RsaAesCrypto::new(), store));
    }

    let identity = store.load()?;
    if identity.name != info.name {
        warn!(
            saved = %identity.name,
            configured = %info.name,
            "Name in {} differs from {}, using the saved one",
            me_info.display(),
            transfer_info.display()
        );
    }
    Session::from_identity(identity, RsaAesCrypto::new(), store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum;
    use crate::config::Identity;
    use crate::protocol::{ClientId, RequestCode, ResponseCode};
    use crate::testing::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backup_registers_then_uploads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let (mut conn, server) = scripted_server(vec![
            registered_reply(),
            key_reply(ResponseCode::PublicKeyReceived),
            crc_reply("notes.txt", 11, checksum::cksum(b"hello world")),
            bare(ResponseCode::MessageReceived),
        ]);
        let mut session = Session::new(
            "alice",
            FakeCrypto::default(),
            IdentityStore::new(dir.path().join("me.info")),
        );
        let options = TransferOptions {
            chunk_size: 1024,
            show_progress: false,
        };

        let report = backup(&mut conn, &mut session, &path, &options)
            .await
            .unwrap();
        assert_eq!(report.checksum, 1135714720);

        let codes: Vec<RequestCode> = server.await.unwrap().iter().map(|r| r.code()).collect();
        assert_eq!(
            codes,
            vec![
                RequestCode::Registration,
                RequestCode::SendPublicKey,
                RequestCode::SendFile,
                RequestCode::ValidCrc
            ]
        );
    }

    #[test]
    fn test_open_session_without_identity() {
        let dir = TempDir::new().unwrap();
        let info = TransferInfo::parse("localhost\nalice\nfile.bin\n").unwrap();

        let session =
            open_session(&info, Path::new("transfer.info"), &dir.path().join("me.info")).unwrap();
        assert_eq!(session.name(), "alice");
        assert!(session.client_id().is_unset());
    }

    #[test]
    fn test_open_session_with_corrupt_identity() {
        let dir = TempDir::new().unwrap();
        let me_info = dir.path().join("me.info");
        std::fs::write(&me_info, "alice\n2a2a\nAAAA\n").unwrap();
        let info = TransferInfo::parse("localhost\nalice\nfile.bin\n").unwrap();

        assert!(open_session(&info, Path::new("transfer.info"), &me_info).is_err());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_name_mismatch_names_configured_files() {
        let dir = TempDir::new().unwrap();
        let me_info = dir.path().join("saved-identity");
        let transfer_info = dir.path().join("nightly.info");

        let mut crypto = RsaAesCrypto::new();
        crypto.generate_keypair().unwrap();
        IdentityStore::new(&me_info)
            .save(&Identity {
                name: "bob".to_string(),
                client_id: ClientId([0x42; 16]),
                private_key: crypto.export_private_key().unwrap(),
            })
            .unwrap();
        let info = TransferInfo::parse("localhost\nalice\nfile.bin\n").unwrap();

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let session = tracing::subscriber::with_default(subscriber, || {
            open_session(&info, &transfer_info, &me_info).unwrap()
        });

        assert_eq!(session.name(), "bob");
        assert_eq!(session.client_id(), ClientId([0x42; 16]));

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains(&transfer_info.display().to_string()), "{}", output);
        assert!(output.contains(&me_info.display().to_string()), "{}", output);
    }
}
