use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::json;
use tracing::debug;

use agrochain_events::{CosechaFacturada, DeliveryError, EventSink, JsonEnvelope};

/// Header carrying the envelope's dedup key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Delivers `cosecha_facturada` as `PUT {base}/harvests/{harvestId}/status`.
///
/// Blocking: only call it from a delivery worker thread, never from an async
/// task. The client is built on first use, on that thread.
#[derive(Debug)]
pub struct HttpCallbackSink {
    base_url: String,
    timeout: Duration,
    client: Mutex<Option<Client>>,
}

impl HttpCallbackSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn status_url(&self, harvest_id: impl std::fmt::Display) -> String {
        format!("{}/harvests/{harvest_id}/status", self.base_url)
    }

    fn client(&self) -> Result<Client, DeliveryError> {
        let mut slot = self
            .client
            .lock()
            .map_err(|_| DeliveryError::transient("http client lock poisoned"))?;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| DeliveryError::transient(format!("failed to build http client: {e}")))?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

impl Drop for HttpCallbackSink {
    fn drop(&mut self) {
        // A blocking client must not be dropped on an async runtime thread.
        let client = self.client.get_mut().ok().and_then(Option::take);
        if let Some(client) = client {
            let _ = std::thread::Builder::new()
                .name("http-callback-drop".to_string())
                .spawn(move || drop(client));
        }
    }
}

/// Map a response status to an attempt outcome.
fn classify(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Err(DeliveryError::transient(format!("callback returned {status}")))
    } else {
        Err(DeliveryError::permanent(format!("callback returned {status}")))
    }
}

impl EventSink for HttpCallbackSink {
    fn name(&self) -> &str {
        "http-callback"
    }

    fn deliver(&self, envelope: &JsonEnvelope) -> Result<(), DeliveryError> {
        let event = match envelope.decode::<CosechaFacturada>() {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                return Err(DeliveryError::permanent(format!("malformed callback payload: {e}")));
            }
            None => {
                return Err(DeliveryError::permanent(format!(
                    "no callback route for topic {}",
                    envelope.topic()
                )));
            }
        };

        let url = self.status_url(event.harvest_id);
        debug!(%url, key = envelope.key(), "sending harvest status callback");

        let response = self
            .client()?
            .put(&url)
            .header(IDEMPOTENCY_KEY_HEADER, envelope.key())
            .json(&json!({ "invoiceId": event.invoice_id }))
            .send()
            .map_err(|e| DeliveryError::transient(format!("callback request failed: {e}")))?;

        classify(response.status())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;
    use agrochain_core::{HarvestId, InvoiceId};
    use agrochain_events::EventEnvelope;

    fn callback_envelope() -> (CosechaFacturada, JsonEnvelope) {
        let event = CosechaFacturada {
            harvest_id: HarvestId::new(),
            invoice_id: InvoiceId::new(),
        };
        let envelope = EventEnvelope::from_event(event.dedup_key(), &event).unwrap();
        (event, envelope)
    }

    /// Accept one request, answer with `status`, and hand back the raw request.
    fn one_shot_server(status: &'static str) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let join = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let mut stream = stream;
            write!(stream, "HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .unwrap();
            format!("{head}{}", String::from_utf8_lossy(&body))
        });
        (format!("http://{addr}"), join)
    }

    #[test]
    fn status_classification() {
        assert!(classify(StatusCode::OK).is_ok());
        assert!(classify(StatusCode::NO_CONTENT).is_ok());
        assert!(!classify(StatusCode::SERVICE_UNAVAILABLE).unwrap_err().is_permanent());
        assert!(!classify(StatusCode::TOO_MANY_REQUESTS).unwrap_err().is_permanent());
        assert!(classify(StatusCode::NOT_FOUND).unwrap_err().is_permanent());
        assert!(classify(StatusCode::BAD_REQUEST).unwrap_err().is_permanent());
    }

    #[test]
    fn puts_the_invoice_id_to_the_status_endpoint() {
        let (base, server) = one_shot_server("200 OK");
        let sink = HttpCallbackSink::new(format!("{base}/"), Duration::from_secs(5));
        let (event, envelope) = callback_envelope();

        sink.deliver(&envelope).unwrap();

        let request = server.join().unwrap();
        assert!(request.starts_with(&format!("PUT /harvests/{}/status ", event.harvest_id)));
        assert!(request.to_ascii_lowercase().contains(&format!(
            "idempotency-key: {}",
            event.dedup_key().to_ascii_lowercase()
        )));
        assert!(request.contains(&event.invoice_id.to_string()));
    }

    #[test]
    fn client_errors_are_permanent() {
        let (base, server) = one_shot_server("404 Not Found");
        let sink = HttpCallbackSink::new(base, Duration::from_secs(5));
        let (_, envelope) = callback_envelope();

        let err = sink.deliver(&envelope).unwrap_err();
        server.join().unwrap();
        assert!(err.is_permanent());
    }

    #[test]
    fn unreachable_endpoint_is_transient() {
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let sink = HttpCallbackSink::new(format!("http://{addr}"), Duration::from_millis(500));
        let (_, envelope) = callback_envelope();

        let err = sink.deliver(&envelope).unwrap_err();
        assert!(!err.is_permanent());
    }

    #[test]
    fn other_topics_are_rejected() {
        let sink = HttpCallbackSink::new("http://127.0.0.1:9", Duration::from_millis(100));
        let envelope = EventEnvelope::new("nueva_cosecha", "k", serde_json::json!({}));

        assert!(sink.deliver(&envelope).unwrap_err().is_permanent());
    }
}
