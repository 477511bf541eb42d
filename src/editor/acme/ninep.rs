//! Minimal 9P2000 client for talking to acme's file server.
//!
//! One request is in flight at a time, so a connection is owned by exactly one
//! consumer (a window session or the creation log reader).

use crate::acme_error;
use crate::error::{CompleteError, Result};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::debug;

pub const VERSION: &str = "9P2000";
pub const DEFAULT_MSIZE: u32 = 8192;
/// Заголовок Twrite/Rread: size[4] type[1] tag[2] fid[4] offset[8] count[4] + запас
const IOHDRSZ: u32 = 24;
const NOTAG: u16 = 0xffff;
const NOFID: u32 = 0xffff_ffff;
const ROOT_FID: u32 = 0;
const MAX_WELEM: usize = 16;

pub const OREAD: u8 = 0;
pub const OWRITE: u8 = 1;
pub const ORDWR: u8 = 2;

const TVERSION: u8 = 100;
const TATTACH: u8 = 104;
const RERROR: u8 = 107;
const TWALK: u8 = 110;
const TOPEN: u8 = 112;
const TREAD: u8 = 116;
const TWRITE: u8 = 118;
const TCLUNK: u8 = 120;

/// Построитель тела T-сообщения
#[derive(Debug, Default)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    /// Строка с длиной u16; более длинные строки в 9P не кодируются
    pub fn string(self, s: &str) -> Result<Self> {
        let len = u16::try_from(s.len())
            .map_err(|_| acme_error!(protocol, "строка длиной {} байт не помещается в 9P", s.len()))?;
        let mut this = self.u16(len);
        this.buf.extend_from_slice(s.as_bytes());
        Ok(this)
    }

    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Полное сообщение с заголовком size[4] type[1] tag[2]
    pub fn finish(self, kind: u8, tag: u16) -> Vec<u8> {
        let size = (4 + 1 + 2 + self.buf.len()) as u32;
        let mut out = Vec::with_capacity(size as usize);
        out.extend_from_slice(&size.to_le_bytes());
        out.push(kind);
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&self.buf);
        out
    }
}

/// Чтение полей R-сообщения
#[derive(Debug)]
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return CompleteError::protocol(format!(
                "сообщение обрезано: нужно {} байт с позиции {}, есть {}",
                n,
                self.pos,
                self.buf.len()
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn skip_qid(&mut self) -> Result<()> {
        self.take(13).map(|_| ())
    }
}

pub struct NinepClient<S = UnixStream> {
    stream: S,
    msize: u32,
    next_fid: u32,
    next_tag: u16,
}

impl NinepClient<UnixStream> {
    /// Подключиться к файловому серверу по Unix-сокету и выполнить version/attach
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket).await?;
        let mut client = NinepClient::new(stream);
        client.handshake().await?;
        Ok(client)
    }
}

impl<S> NinepClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            msize: DEFAULT_MSIZE,
            next_fid: ROOT_FID + 1,
            next_tag: 1,
        }
    }

    pub async fn handshake(&mut self) -> Result<()> {
        self.version().await?;
        let user = std::env::var("USER").unwrap_or_else(|_| "none".to_string());
        self.attach(&user).await
    }

    pub fn msize(&self) -> u32 {
        self.msize
    }

    fn iounit(&self) -> usize {
        (self.msize - IOHDRSZ) as usize
    }

    fn alloc_tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = self.next_tag.wrapping_add(1);
        if self.next_tag == NOTAG {
            self.next_tag = 1;
        }
        tag
    }

    fn alloc_fid(&mut self) -> u32 {
        let fid = self.next_fid;
        self.next_fid = self.next_fid.wrapping_add(1).max(ROOT_FID + 1);
        fid
    }

    async fn rpc(&mut self, kind: u8, tag: u16, body: MessageBuilder) -> Result<Vec<u8>> {
        let message = body.finish(kind, tag);
        self.stream.write_all(&message).await?;
        self.stream.flush().await?;

        let size = self.stream.read_u32_le().await?;
        if size < 7 || size > self.msize.max(DEFAULT_MSIZE) + IOHDRSZ {
            return CompleteError::protocol(format!("недопустимый размер ответа: {}", size));
        }
        let mut response = vec![0u8; size as usize - 4];
        self.stream.read_exact(&mut response).await?;

        let mut reader = MessageReader::new(&response);
        let rkind = reader.u8()?;
        let rtag = reader.u16()?;
        if rtag != tag {
            return Err(acme_error!(protocol, "ожидался tag {}, получен {}", tag, rtag));
        }
        if rkind == RERROR {
            return Err(CompleteError::Protocol(reader.string()?));
        }
        if rkind != kind + 1 {
            return Err(acme_error!(protocol, "ожидался ответ типа {}, получен {}", kind + 1, rkind));
        }

        response.drain(..3);
        Ok(response)
    }

    pub async fn version(&mut self) -> Result<()> {
        let body = MessageBuilder::new().u32(DEFAULT_MSIZE).string(VERSION)?;
        let response = self.rpc(TVERSION, NOTAG, body).await?;
        let mut reader = MessageReader::new(&response);
        let msize = reader.u32()?;
        let version = reader.string()?;
        if !version.starts_with(VERSION) {
            return Err(acme_error!(protocol, "сервер не поддерживает {}: {}", VERSION, version));
        }
        if msize <= IOHDRSZ {
            return Err(acme_error!(protocol, "слишком маленький msize: {}", msize));
        }
        self.msize = msize.min(DEFAULT_MSIZE);
        debug!("9P version {} msize {}", version, self.msize);
        Ok(())
    }

    pub async fn attach(&mut self, user: &str) -> Result<()> {
        let tag = self.alloc_tag();
        let body = MessageBuilder::new()
            .u32(ROOT_FID)
            .u32(NOFID)
            .string(user)?
            .string("")?;
        self.rpc(TATTACH, tag, body).await?;
        Ok(())
    }

    /// Пройти от корня по пути `a/b` и вернуть новый fid
    pub async fn walk(&mut self, path: &str) -> Result<u32> {
        let names: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if names.len() > MAX_WELEM {
            return Err(acme_error!(protocol, "слишком длинный путь: {}", path));
        }

        let fid = self.alloc_fid();
        let tag = self.alloc_tag();
        let mut body = MessageBuilder::new()
            .u32(ROOT_FID)
            .u32(fid)
            .u16(names.len() as u16);
        for name in &names {
            body = body.string(name)?;
        }

        let response = self.rpc(TWALK, tag, body).await?;
        let mut reader = MessageReader::new(&response);
        let nwqid = reader.u16()? as usize;
        if nwqid != names.len() {
            // При частичном проходе newfid не создаётся
            return Err(acme_error!(protocol, "файл не найден: {}", path));
        }
        Ok(fid)
    }

    pub async fn open(&mut self, fid: u32, mode: u8) -> Result<()> {
        let tag = self.alloc_tag();
        let body = MessageBuilder::new().u32(fid).u8(mode);
        let response = self.rpc(TOPEN, tag, body).await?;
        let mut reader = MessageReader::new(&response);
        reader.skip_qid()?;
        Ok(())
    }

    /// walk + open; при ошибке open fid освобождается
    pub async fn open_file(&mut self, path: &str, mode: u8) -> Result<u32> {
        let fid = self.walk(path).await?;
        if let Err(e) = self.open(fid, mode).await {
            let _ = self.clunk(fid).await;
            return Err(e);
        }
        Ok(fid)
    }

    pub async fn read(&mut self, fid: u32, offset: u64, count: usize) -> Result<Vec<u8>> {
        let count = count.min(self.iounit()) as u32;
        let tag = self.alloc_tag();
        let body = MessageBuilder::new().u32(fid).u64(offset).u32(count);
        let response = self.rpc(TREAD, tag, body).await?;
        let mut reader = MessageReader::new(&response);
        let n = reader.u32()? as usize;
        Ok(reader.bytes(n)?.to_vec())
    }

    /// Прочитать файл целиком (до чтения нулевой длины)
    pub async fn read_all(&mut self, fid: u32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read(fid, out.len() as u64, self.iounit()).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Записать данные кусками по iounit. Пустые данные отправляются одним Twrite
    /// нулевой длины: для acme это удаление выделенного адреса.
    pub async fn write(&mut self, fid: u32, offset: u64, data: &[u8]) -> Result<()> {
        let mut written = 0usize;
        loop {
            let end = (written + self.iounit()).min(data.len());
            let chunk = &data[written..end];
            let tag = self.alloc_tag();
            let body = MessageBuilder::new()
                .u32(fid)
                .u64(offset + written as u64)
                .u32(chunk.len() as u32)
                .bytes(chunk);
            let response = self.rpc(TWRITE, tag, body).await?;
            let n = MessageReader::new(&response).u32()? as usize;

            written += n;
            if written >= data.len() {
                return Ok(());
            }
            if n == 0 {
                return Err(acme_error!(protocol, "сервер принял 0 байт из {}", chunk.len()));
            }
        }
    }

    pub async fn clunk(&mut self, fid: u32) -> Result<()> {
        let tag = self.alloc_tag();
        self.rpc(TCLUNK, tag, MessageBuilder::new().u32(fid)).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::{duplex, DuplexStream};

    /// Поддельный файловый сервер: файлы по путям, журнал всех записей
    pub(crate) struct FakeServer {
        pub files: HashMap<String, Vec<u8>>,
        pub writes: Vec<(String, Vec<u8>)>,
        /// Отвечать Rerror на каждый Tclunk
        pub reject_clunk: bool,
        fids: HashMap<u32, String>,
    }

    impl FakeServer {
        pub(crate) fn new(files: &[(&str, &str)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                    .collect(),
                writes: Vec::new(),
                reject_clunk: false,
                fids: HashMap::new(),
            }
        }

        fn error(tag: u16, msg: &str) -> Vec<u8> {
            MessageBuilder::new().string(msg).unwrap().finish(RERROR, tag)
        }

        fn handle(&mut self, message: &[u8]) -> Vec<u8> {
            let mut r = MessageReader::new(message);
            let kind = r.u8().unwrap();
            let tag = r.u16().unwrap();
            match kind {
                TVERSION => {
                    let msize = r.u32().unwrap();
                    MessageBuilder::new()
                        .u32(msize)
                        .string(VERSION)
                        .unwrap()
                        .finish(kind + 1, tag)
                }
                TATTACH => {
                    self.fids.insert(r.u32().unwrap(), String::new());
                    MessageBuilder::new().bytes(&[0; 13]).finish(kind + 1, tag)
                }
                TWALK => {
                    let _fid = r.u32().unwrap();
                    let newfid = r.u32().unwrap();
                    let n = r.u16().unwrap();
                    let names: Vec<String> = (0..n).map(|_| r.string().unwrap()).collect();
                    let path = names.join("/");
                    if !self.files.contains_key(&path) {
                        return Self::error(tag, "file does not exist");
                    }
                    self.fids.insert(newfid, path);
                    let mut body = MessageBuilder::new().u16(n);
                    for _ in 0..n {
                        body = body.bytes(&[0; 13]);
                    }
                    body.finish(kind + 1, tag)
                }
                TOPEN => MessageBuilder::new()
                    .bytes(&[0; 13])
                    .u32(0)
                    .finish(kind + 1, tag),
                TREAD => {
                    let fid = r.u32().unwrap();
                    let mut offset = [0u8; 8];
                    offset.copy_from_slice(r.bytes(8).unwrap());
                    let offset = u64::from_le_bytes(offset) as usize;
                    let count = r.u32().unwrap() as usize;
                    let data = &self.files[&self.fids[&fid]];
                    let start = offset.min(data.len());
                    let end = (start + count).min(data.len());
                    MessageBuilder::new()
                        .u32((end - start) as u32)
                        .bytes(&data[start..end])
                        .finish(kind + 1, tag)
                }
                TWRITE => {
                    let fid = r.u32().unwrap();
                    r.bytes(8).unwrap();
                    let count = r.u32().unwrap() as usize;
                    let data = r.bytes(count).unwrap().to_vec();
                    self.writes.push((self.fids[&fid].clone(), data));
                    MessageBuilder::new().u32(count as u32).finish(kind + 1, tag)
                }
                TCLUNK if self.reject_clunk => Self::error(tag, "clunk refused"),
                TCLUNK => {
                    self.fids.remove(&r.u32().unwrap());
                    MessageBuilder::new().finish(kind + 1, tag)
                }
                _ => Self::error(tag, "unsupported"),
            }
        }

        /// Обслуживать соединение до его закрытия, затем вернуть состояние
        pub(crate) async fn serve(mut self, mut stream: DuplexStream) -> Self {
            loop {
                let size = match stream.read_u32_le().await {
                    Ok(size) => size as usize,
                    Err(_) => return self,
                };
                let mut message = vec![0u8; size - 4];
                if stream.read_exact(&mut message).await.is_err() {
                    return self;
                }
                let reply = self.handle(&message);
                if stream.write_all(&reply).await.is_err() {
                    return self;
                }
            }
        }
    }

    pub(crate) fn spawn_server(
        server: FakeServer,
    ) -> (NinepClient<DuplexStream>, tokio::task::JoinHandle<FakeServer>) {
        let (client_side, server_side) = duplex(64 * 1024);
        let handle = tokio::spawn(server.serve(server_side));
        (NinepClient::new(client_side), handle)
    }

    #[test]
    fn test_message_builder_layout() {
        let message = MessageBuilder::new()
            .u32(8192)
            .string("9P2000")
            .unwrap()
            .finish(TVERSION, NOTAG);
        assert_eq!(&message[..4], &19u32.to_le_bytes());
        assert_eq!(message[4], TVERSION);
        assert_eq!(&message[5..7], &[0xff, 0xff]);
        assert_eq!(&message[7..11], &8192u32.to_le_bytes());
        assert_eq!(&message[11..13], &6u16.to_le_bytes());
        assert_eq!(&message[13..], b"9P2000");
    }

    #[test]
    fn test_builder_rejects_oversized_string() {
        let long = "a".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            MessageBuilder::new().string(&long),
            Err(CompleteError::Protocol(_))
        ));
        let max = "a".repeat(u16::MAX as usize);
        let message = MessageBuilder::new().string(&max).unwrap().finish(TWALK, 1);
        assert_eq!(&message[7..9], &u16::MAX.to_le_bytes());
        assert_eq!(message.len(), 9 + u16::MAX as usize);
    }

    #[tokio::test]
    async fn test_walk_with_oversized_name_fails_before_sending() {
        let server = FakeServer::new(&[]);
        let (mut client, _handle) = spawn_server(server);
        client.handshake().await.unwrap();
        let name = "x".repeat(70_000);
        assert!(matches!(
            client.walk(&name).await,
            Err(CompleteError::Protocol(_))
        ));
    }

    #[test]
    fn test_reader_rejects_truncated_fields() {
        let mut reader = MessageReader::new(&[5, 0, b'a']);
        assert!(reader.string().is_err());
    }

    #[tokio::test]
    async fn test_read_whole_file_and_write() {
        let server = FakeServer::new(&[("index", "line one\nline two\n"), ("1/ctl", "")]);
        let (mut client, handle) = spawn_server(server);
        client.handshake().await.unwrap();

        let fid = client.open_file("index", OREAD).await.unwrap();
        assert_eq!(client.read_all(fid).await.unwrap(), b"line one\nline two\n");
        client.clunk(fid).await.unwrap();

        let ctl = client.open_file("1/ctl", ORDWR).await.unwrap();
        client.write(ctl, 0, b"menu").await.unwrap();
        client.write(ctl, 0, b"").await.unwrap();
        drop(client);

        let server = handle.await.unwrap();
        assert_eq!(
            server.writes,
            vec![
                ("1/ctl".to_string(), b"menu".to_vec()),
                ("1/ctl".to_string(), Vec::new()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_protocol_error() {
        let (mut client, _handle) = spawn_server(FakeServer::new(&[]));
        client.handshake().await.unwrap();
        let err = client.open_file("42/ctl", ORDWR).await.unwrap_err();
        assert!(matches!(err, CompleteError::Protocol(_)));
    }
}
