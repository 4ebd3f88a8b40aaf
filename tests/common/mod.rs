//! 集成测试公共设施：本地 mock Flowdock 端点和内存宿主

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use flowdock_notify::error::GraphError;
use flowdock_notify::graph::{MemoryGraph, RevisionGraph};
use flowdock_notify::{
    BasicRenderer, HostContext, MemorySettings, RepositoryDirectory, RepositoryModel, StaticUsers,
    UserModel,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;

/// mock 收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn content_type(&self) -> &str {
        self.headers.get("content-type").map(String::as_str).unwrap_or("")
    }

    /// JSON 请求体
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }

    /// 表单字段 `payload` 中的 JSON
    pub fn form_payload(&self) -> serde_json::Value {
        let value = self
            .body
            .split('&')
            .find_map(|pair| pair.strip_prefix("payload="))
            .expect("form has a payload field");
        serde_json::from_str(&url_decode(value)).expect("payload field is JSON")
    }
}

fn url_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap();
                out.push(u8::from_str_radix(hex, 16).unwrap());
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).unwrap()
}

/// 本地 mock Flowdock 端点，每个请求返回固定状态码
pub struct MockFlowdock {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    _runtime: Runtime,
}

impl MockFlowdock {
    pub fn start() -> Self {
        Self::with_response(200, "{}")
    }

    pub fn with_response(status: u16, body: &'static str) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        runtime.spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = handle(stream, status, body, recorded).await;
                });
            }
        });

        Self {
            addr,
            requests,
            _runtime: runtime,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(
    mut stream: TcpStream,
    status: u16,
    body: &str,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(header_end + content_length);
    let request_body = String::from_utf8_lossy(&buf[header_end..end]).to_string();

    requests.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body: request_body,
    });

    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// 内存仓库目录
#[derive(Default)]
pub struct MemoryRepositories {
    graphs: HashMap<String, MemoryGraph>,
}

impl MemoryRepositories {
    pub fn with_repository(mut self, name: &str, graph: MemoryGraph) -> Self {
        self.graphs.insert(name.to_string(), graph);
        self
    }
}

impl RepositoryDirectory for MemoryRepositories {
    fn repository(&self, name: &str) -> Option<RepositoryModel> {
        self.graphs.contains_key(name).then(|| RepositoryModel::new(name))
    }

    fn open_graph(&self, name: &str) -> Result<Box<dyn RevisionGraph>, GraphError> {
        self.graphs
            .get(name)
            .cloned()
            .map(|g| Box::new(g) as Box<dyn RevisionGraph>)
            .ok_or_else(|| GraphError::MissingRepository(name.to_string()))
    }
}

/// 收集日志输出，配合 `tracing::subscriber::with_default` 使用
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// 仓库存在但提交图打不开
pub struct BrokenRepositories;

impl RepositoryDirectory for BrokenRepositories {
    fn repository(&self, name: &str) -> Option<RepositoryModel> {
        Some(RepositoryModel::new(name))
    }

    fn open_graph(&self, _name: &str) -> Result<Box<dyn RevisionGraph>, GraphError> {
        Err(GraphError::Backend("object database is corrupt".to_string()))
    }
}

/// 指向 mock 的基础设置
pub fn settings(mock: &MockFlowdock) -> MemorySettings {
    MemorySettings::new()
        .with("flowdock.apiUrl", mock.url())
        .with("flowdock.defaultToken", "T0")
        .with("web.canonicalUrl", "https://git.example.com")
}

pub fn host(settings: MemorySettings, repositories: impl RepositoryDirectory + 'static) -> HostContext {
    HostContext::new(
        Arc::new(settings),
        Arc::new(
            StaticUsers::new()
                .with_user(UserModel::new("jane").with_display_name("Jane Doe").with_email("jane@example.com"))
                .with_user(UserModel::new("bob").with_display_name("Bob Smith").with_email("bob@example.com")),
        ),
        Arc::new(repositories),
        Arc::new(BasicRenderer::new()),
    )
}
