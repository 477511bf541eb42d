//! acme backend: 9P2000 over the plan9port namespace socket.

pub mod event_codec;
pub mod ninep;

use crate::config::EditorConfig;
use crate::error::{CompleteError, Result};
use crate::events::{LogEntry, WindowEvent, WindowId, WindowInfo};
use crate::utils::namespace;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use self::event_codec::{decode_event, encode_event, parse_index};
use self::ninep::{NinepClient, OREAD, ORDWR, OWRITE};
use super::r#trait::{CreationLog, Editor, EditorWindow, WindowFile};

pub struct AcmeEditor {
    socket: PathBuf,
}

impl AcmeEditor {
    pub fn new(config: &EditorConfig) -> Result<Self> {
        let socket = namespace::acme_socket(config.socket.as_deref())?;
        info!("Сокет acme: {:?}", socket);
        Ok(Self { socket })
    }

    async fn connect(&self) -> Result<NinepClient> {
        NinepClient::connect(&self.socket).await.map_err(|e| {
            warn!("Не удалось подключиться к acme через {:?}: {}", self.socket, e);
            e
        })
    }
}

#[async_trait::async_trait]
impl Editor for AcmeEditor {
    async fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        let mut client = self.connect().await?;
        read_index(&mut client).await
    }

    async fn open_window(&self, id: WindowId) -> Result<Box<dyn EditorWindow>> {
        let open_failed = |e: CompleteError| CompleteError::WindowOpenFailed {
            id,
            reason: e.to_string(),
        };
        let client = self.connect().await.map_err(open_failed)?;
        let window = AcmeWindow::open(client, id).await.map_err(open_failed)?;
        Ok(Box::new(window))
    }

    async fn open_log(&self) -> Result<Box<dyn CreationLog>> {
        let mut client = self.connect().await?;
        let fid = client.open_file("log", OREAD).await?;
        info!("Подписка на журнал окон acme открыта");
        Ok(Box::new(AcmeLog::new(client, fid)))
    }
}

async fn read_index<S>(client: &mut NinepClient<S>) -> Result<Vec<WindowInfo>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let fid = client.open_file("index", OREAD).await?;
    let data = client.read_all(fid).await?;
    if let Err(e) = client.clunk(fid).await {
        debug!("Не удалось закрыть index: {}", e);
    }

    let windows = parse_index(&data);
    debug!("В индексе acme {} окон", windows.len());
    Ok(windows)
}

/// Окно acme со своим соединением. Файлы открываются лениво и держатся открытыми:
/// адрес, записанный в addr, действует, пока открыт этот fid.
pub struct AcmeWindow<S = UnixStream> {
    id: WindowId,
    client: NinepClient<S>,
    fids: HashMap<WindowFile, u32>,
    events: Vec<u8>,
}

impl<S> AcmeWindow<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub async fn open(mut client: NinepClient<S>, id: WindowId) -> Result<Self> {
        let ctl = client.open_file(&format!("{}/ctl", id), ORDWR).await?;
        let mut fids = HashMap::new();
        fids.insert(WindowFile::Ctl, ctl);
        Ok(Self {
            id,
            client,
            fids,
            events: Vec::new(),
        })
    }

    async fn fid(&mut self, file: WindowFile) -> Result<u32> {
        if let Some(&fid) = self.fids.get(&file) {
            return Ok(fid);
        }
        let mode = match file {
            WindowFile::Tag => OREAD,
            WindowFile::Errors => OWRITE,
            _ => ORDWR,
        };
        let fid = self
            .client
            .open_file(&format!("{}/{}", self.id, file), mode)
            .await?;
        self.fids.insert(file, fid);
        Ok(fid)
    }
}

#[async_trait::async_trait]
impl<S> EditorWindow for AcmeWindow<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn id(&self) -> WindowId {
        self.id
    }

    async fn read(&mut self, file: WindowFile, max: usize) -> Result<Vec<u8>> {
        let fid = self.fid(file).await?;
        self.client.read(fid, 0, max).await
    }

    async fn write(&mut self, file: WindowFile, data: &[u8]) -> Result<()> {
        let fid = self.fid(file).await?;
        self.client.write(fid, 0, data).await
    }

    async fn set_addr(&mut self, q0: u32, q1: u32) -> Result<()> {
        self.write(WindowFile::Addr, format!("#{},#{}", q0, q1).as_bytes())
            .await
    }

    async fn next_event(&mut self) -> Result<Option<WindowEvent>> {
        loop {
            if let Some((event, used)) = decode_event(&self.events)? {
                self.events.drain(..used);
                return Ok(Some(event));
            }

            let fid = self.fid(WindowFile::Event).await?;
            let chunk = self.client.read(fid, 0, self.client.msize() as usize).await?;
            if chunk.is_empty() {
                return Ok(None);
            }
            self.events.extend_from_slice(&chunk);
        }
    }

    async fn resubmit_event(&mut self, event: &WindowEvent) -> Result<()> {
        let message = encode_event(event);
        self.write(WindowFile::Event, message.as_bytes())
            .await
            .map_err(|e| CompleteError::EventResubmitFailed(e.to_string()))
    }

    async fn write_error(&mut self, text: &str) -> Result<()> {
        self.write(WindowFile::Errors, text.as_bytes()).await
    }

    async fn close(self: Box<Self>) {
        let mut window = *self;
        for (file, fid) in std::mem::take(&mut window.fids) {
            if let Err(e) = window.client.clunk(fid).await {
                debug!("Не удалось закрыть {} окна {}: {}", file, window.id, e);
            }
        }
    }
}

pub struct AcmeLog<S = UnixStream> {
    client: NinepClient<S>,
    fid: u32,
    pending: Vec<u8>,
}

impl<S> AcmeLog<S> {
    fn new(client: NinepClient<S>, fid: u32) -> Self {
        Self {
            client,
            fid,
            pending: Vec::new(),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line[..end]).into_owned())
    }
}

#[async_trait::async_trait]
impl<S> CreationLog for AcmeLog<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        loop {
            if let Some(line) = self.take_line() {
                return LogEntry::parse(&line).map(Some);
            }

            let chunk = match self.client.read(self.fid, 0, self.client.msize() as usize).await {
                Ok(chunk) => chunk,
                // Обрыв соединения не восстанавливается
                Err(CompleteError::Io(e)) => {
                    warn!("Соединение с журналом acme потеряно: {}", e);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            if chunk.is_empty() {
                return Ok(None);
            }
            self.pending.extend_from_slice(&chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ninep::tests::{spawn_server, FakeServer};
    use super::*;
    use crate::events::LogOp;

    #[tokio::test]
    async fn test_window_operations_hit_expected_files() {
        let server = FakeServer::new(&[
            ("7/ctl", ""),
            ("7/tag", "/tmp/foo.go Del Snarf | Look"),
            ("7/addr", ""),
            ("7/data", ""),
            ("7/errors", ""),
            ("7/event", "KI10 11 0 1 \x0f\nMx0 3 0 3 Put\n"),
        ]);
        let (mut client, handle) = spawn_server(server);
        client.handshake().await.unwrap();

        let mut window = AcmeWindow::open(client, WindowId(7)).await.unwrap();
        let tag = window.read(WindowFile::Tag, 1024).await.unwrap();
        assert_eq!(crate::events::name_from_tag(&tag), "/tmp/foo.go");

        let first = window.next_event().await.unwrap().unwrap();
        assert!(first.is_keyboard_byte(0x0f));
        window.set_addr(first.q0, first.q1).await.unwrap();
        window.write(WindowFile::Data, b"").await.unwrap();

        let second = window.next_event().await.unwrap().unwrap();
        window.resubmit_event(&second).await.unwrap();
        window.write_error("no completions\n").await.unwrap();

        Box::new(window).close().await;
        let server = handle.await.unwrap();
        assert_eq!(
            server.writes,
            vec![
                ("7/addr".to_string(), b"#10,#11".to_vec()),
                ("7/data".to_string(), Vec::new()),
                ("7/event".to_string(), b"Mx0 3 \n".to_vec()),
                ("7/errors".to_string(), b"no completions\n".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_log_entry_is_parsed() {
        let server = FakeServer::new(&[("log", "5 new /tmp/bar.go\n6 del /tmp/baz.go\n")]);
        let (mut client, _handle) = spawn_server(server);
        client.handshake().await.unwrap();
        let fid = client.open_file("log", OREAD).await.unwrap();

        let mut log = AcmeLog::new(client, fid);
        let entry = log.next_entry().await.unwrap().unwrap();
        assert_eq!(entry.id, WindowId(5));
        assert_eq!(entry.op, LogOp::New);
        assert_eq!(entry.name, "/tmp/bar.go");

        // Обе записи пришли одним чтением
        let entry = log.next_entry().await.unwrap().unwrap();
        assert_eq!(entry, LogEntry::new(6, LogOp::Delete, "/tmp/baz.go"));
    }

    #[tokio::test]
    async fn test_index_is_listed_and_released() {
        let server = FakeServer::new(&[(
            "index",
            "          4          20           0          0          0 /tmp/foo.go Del Snarf\n",
        )]);
        let (mut client, _handle) = spawn_server(server);
        client.handshake().await.unwrap();

        let windows = read_index(&mut client).await.unwrap();
        assert_eq!(windows, vec![WindowInfo::new(4, "/tmp/foo.go")]);
        // fid index закрыт, новый walk получает свободный fid
        let fid = client.open_file("index", OREAD).await.unwrap();
        client.clunk(fid).await.unwrap();
    }

    #[tokio::test]
    async fn test_index_clunk_failure_is_not_an_error() {
        let mut server = FakeServer::new(&[(
            "index",
            "          2          7           0          1          0 /tmp/ Del\n",
        )]);
        server.reject_clunk = true;
        let (mut client, _handle) = spawn_server(server);
        client.handshake().await.unwrap();

        let windows = read_index(&mut client).await.unwrap();
        assert_eq!(windows, vec![WindowInfo::new(2, "/tmp/")]);
    }

    #[tokio::test]
    async fn test_malformed_event_is_read_error() {
        let server = FakeServer::new(&[("3/ctl", ""), ("3/event", "KIx 1 0 0 \n")]);
        let (mut client, _handle) = spawn_server(server);
        client.handshake().await.unwrap();

        let mut window = AcmeWindow::open(client, WindowId(3)).await.unwrap();
        assert!(matches!(
            window.next_event().await,
            Err(CompleteError::MalformedEvent(_))
        ));
    }

    #[tokio::test]
    async fn test_log_ends_on_empty_read() {
        let server = FakeServer::new(&[("log", "")]);
        let (mut client, _handle) = spawn_server(server);
        client.handshake().await.unwrap();
        let fid = client.open_file("log", OREAD).await.unwrap();

        let mut log = AcmeLog::new(client, fid);
        assert!(log.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_log_ends_when_connection_drops() {
        let server = FakeServer::new(&[("log", "5 new /tmp/bar.go\n")]);
        let (mut client, handle) = spawn_server(server);
        client.handshake().await.unwrap();
        let fid = client.open_file("log", OREAD).await.unwrap();

        handle.abort();
        let _ = handle.await;

        let mut log = AcmeLog::new(client, fid);
        assert!(log.next_entry().await.unwrap().is_none());
    }
}
