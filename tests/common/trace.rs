//! Fake `/cdn-cgi/trace` endpoint.

use axum::Router;
use axum::routing::get;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers with `ip=<addr>` for each scripted address in turn; the last one
/// repeats forever.
pub struct FakeTrace {
    url: String,
    hits: Arc<AtomicUsize>,
}

impl FakeTrace {
    pub async fn start(ips: &[&str]) -> anyhow::Result<Self> {
        anyhow::ensure!(!ips.is_empty(), "fake trace needs at least one address");
        let bodies: Arc<Vec<String>> = Arc::new(
            ips.iter()
                .map(|ip| format!("fl=1f1\nh=cloudflare.com\nip={ip}\nwarp=on\n"))
                .collect(),
        );
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/cdn-cgi/trace",
            get(move || {
                let counter = Arc::clone(&counter);
                let bodies = Arc::clone(&bodies);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    bodies[n.min(bodies.len() - 1)].clone()
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            url: format!("http://{addr}/cdn-cgi/trace"),
            hits,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    #[allow(dead_code)]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
