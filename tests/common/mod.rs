#![allow(dead_code)]

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

pub fn account_page(account: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><meta property="og:image" content="https://cdn.example/{account}.jpg"></head>
  <body>
    <h1>{account} Official</h1>
    <div class="item">
      <a href="/p/{account}One/"><img src="https://cdn.example/{account}1.jpg" alt="First from {account}"></a>
      <div class="time">2 hours ago</div>
    </div>
    <div class="item">
      <a href="/p/{account}Two/"><img src="https://cdn.example/{account}2.jpg" alt="Second &lt;b&gt; line"></a>
      <div class="time">1 day ago</div>
    </div>
  </body>
</html>
"#
    )
}

/// Local HTTP stub. `route` maps the request URL (path and query) to a
/// status and body; every URL served is kept in `requests`.
pub struct StubServer {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<String>>>,
    shutdown: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn start<F>(route: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            let request = match server.recv_timeout(Duration::from_millis(50)) {
                Ok(Some(req)) => req,
                Ok(None) => continue,
                Err(_) => break,
            };

            let url = request.url().to_string();
            seen.lock().unwrap().push(url.clone());
            let (status, body) = route(&url);
            let response = tiny_http::Response::from_string(body).with_status_code(status);
            let _ = request.respond(response);
        });

        Self { base_url, requests, shutdown: Some(shutdown_tx), handle: Some(handle) }
    }

    /// Mirror stub: `/{account}/` serves a page, except accounts in `failing`
    /// (HTTP 500) and `/blocked/` (a page without post items).
    pub fn mirror(failing: &'static [&'static str]) -> Self {
        Self::start(move |url| {
            let account = url.trim_matches('/');
            if failing.contains(&account) {
                (500, "upstream error".to_string())
            } else if account == "blocked" {
                (200, "<html><body><h1>Please wait</h1></body></html>".to_string())
            } else {
                (200, account_page(account))
            }
        })
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
