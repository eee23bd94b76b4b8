//! Fake collaborators for unit tests.

use crate::error::{CommandError, LookupError, ResolveError};
use crate::firewall::Firewall;
use crate::resolver::EgressResolver;
use crate::vpn::VpnClient;
use async_trait::async_trait;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn command_failed(program: &str, stderr: &str) -> CommandError {
    CommandError::Failed {
        program: program.to_string(),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

// ============================================================================
// Firewall
// ============================================================================

/// Records every block/unblock call and the rules that would be active.
/// Can fail every call, or only the first few blocks.
#[derive(Default)]
pub struct RecordingFirewall {
    fail: bool,
    failing_blocks: AtomicUsize,
    blocked: Mutex<Vec<IpAddr>>,
    unblocked: Mutex<Vec<IpAddr>>,
    rules: Mutex<BTreeSet<IpAddr>>,
}

impl RecordingFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn failing_first(blocks: usize) -> Self {
        Self {
            failing_blocks: AtomicUsize::new(blocks),
            ..Self::default()
        }
    }

    pub fn active_rules(&self) -> BTreeSet<IpAddr> {
        self.rules.lock().clone()
    }

    pub fn blocked(&self) -> Vec<IpAddr> {
        self.blocked.lock().clone()
    }

    pub fn unblocked(&self) -> Vec<IpAddr> {
        self.unblocked.lock().clone()
    }
}

#[async_trait]
impl Firewall for RecordingFirewall {
    async fn block(&self, ip: IpAddr) -> Result<(), CommandError> {
        self.blocked.lock().push(ip);
        let scripted_failure = self
            .failing_blocks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.fail || scripted_failure {
            return Err(command_failed("iptables", "Permission denied"));
        }
        self.rules.lock().insert(ip);
        Ok(())
    }

    async fn unblock(&self, ip: IpAddr) -> Result<(), CommandError> {
        self.unblocked.lock().push(ip);
        if self.fail {
            return Err(command_failed("iptables", "Bad rule"));
        }
        self.rules.lock().remove(&ip);
        Ok(())
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Answers lookups from a script. `None` is a failed lookup. Once the script
/// runs out, the last answer repeats.
pub struct ScriptedResolver {
    answers: Mutex<VecDeque<Option<IpAddr>>>,
    last: Mutex<Option<IpAddr>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    pub fn new<I>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<&'static str>>,
    {
        let answers = answers
            .into_iter()
            .map(|answer| answer.map(|ip| ip.parse().expect("scripted answer must be an IP")))
            .collect();
        Self {
            answers: Mutex::new(answers),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EgressResolver for ScriptedResolver {
    async fn resolve_current_ip(&self) -> Result<IpAddr, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = match self.answers.lock().pop_front() {
            Some(answer) => {
                *self.last.lock() = answer;
                answer
            }
            None => *self.last.lock(),
        };
        answer.ok_or(ResolveError {
            attempts: 1,
            last: LookupError::MissingIp,
        })
    }
}

// ============================================================================
// VPN
// ============================================================================

/// Logs "disconnect"/"connect" calls and fails whichever step it was told to.
#[derive(Default)]
pub struct ScriptedVpn {
    fail_disconnect: bool,
    fail_connect: bool,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedVpn {
    pub fn working() -> Self {
        Self::default()
    }

    pub fn failing_disconnect() -> Self {
        Self {
            fail_disconnect: true,
            ..Self::default()
        }
    }

    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VpnClient for ScriptedVpn {
    async fn disconnect(&self) -> Result<(), CommandError> {
        self.calls.lock().push("disconnect");
        if self.fail_disconnect {
            return Err(command_failed("warp-cli", "Unable to connect to the daemon"));
        }
        Ok(())
    }

    async fn connect(&self) -> Result<(), CommandError> {
        self.calls.lock().push("connect");
        if self.fail_connect {
            return Err(command_failed("warp-cli", "Registration missing"));
        }
        Ok(())
    }
}

// ============================================================================
// Trace endpoint
// ============================================================================

/// One canned response of the fake trace endpoint.
#[derive(Clone)]
pub struct TraceReply {
    status: StatusCode,
    body: String,
}

impl TraceReply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
        }
    }

    pub fn status(code: u16) -> Self {
        Self {
            status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body: String::new(),
        }
    }
}

/// Serve `replies` in order on a local `/cdn-cgi/trace`; the last one repeats.
///
/// Returns the trace URL and the request counter.
pub async fn spawn_trace_server(replies: Vec<TraceReply>) -> (String, Arc<AtomicUsize>) {
    assert!(!replies.is_empty(), "trace server needs at least one reply");
    let hits = Arc::new(AtomicUsize::new(0));
    let replies = Arc::new(replies);

    let counter = Arc::clone(&hits);
    let app = Router::new().route(
        "/cdn-cgi/trace",
        get(move || {
            let counter = Arc::clone(&counter);
            let replies = Arc::clone(&replies);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = &replies[n.min(replies.len() - 1)];
                (reply.status, reply.body.clone())
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind trace server");
    let addr = listener.local_addr().expect("trace server address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}/cdn-cgi/trace"), hits)
}
