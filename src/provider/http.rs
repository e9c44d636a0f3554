use anyhow::Context;
use reqwest::Client;
use tracing::debug;

use crate::{
    error::Error,
    types::{ServerInfo, ServerInfoBody, ServerInfoRpcRequest},
};

#[derive(Debug)]
pub struct HTTP {
    pub rpc_url: String,
    client: Client,
}

impl HTTP {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        HTTP {
            rpc_url: rpc_url.into(),
            client: Client::new(),
        }
    }

    pub async fn get_server_info(&self) -> Result<ServerInfo, Error> {
        debug!("POST {} server_info", &self.rpc_url);

        let json = self
            .client
            .post(self.rpc_url.as_str())
            .json(&ServerInfoRpcRequest::default())
            .send()
            .await
            .with_context(|| {
                format!("server_info request to {} failed", &self.rpc_url)
            })?
            .json::<ServerInfoBody>()
            .await?;

        Ok(json.result.info)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    async fn serve_once(body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                let read = stream.read(&mut buffer).await.unwrap();
                request.extend_from_slice(&buffer[..read]);
                let text = String::from_utf8_lossy(&request);
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (key, value) = line.split_once(':')?;
                            key.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length {
                        break;
                    }
                }
                if read == 0 {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (url, handle)
    }

    #[tokio::test]
    async fn test_get_server_info() {
        let body = json!({
            "result": {
                "info": {
                    "complete_ledgers": "32570-90000000",
                    "server_state": "full",
                    "validated_ledger": {"seq": 90000000, "hash": "ABC"}
                },
                "status": "success"
            }
        });
        let (url, server) = serve_once(body.to_string()).await;

        let http = HTTP::new(url);
        let info = http.get_server_info().await.unwrap();

        assert_eq!(info.validated_seq(), Some(90000000));
        assert_eq!(info.server_state, "full");
        assert_eq!(info.complete_ledgers, "32570-90000000");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST / "));
        assert!(request.ends_with(r#"{"method":"server_info","params":[]}"#));
    }

    #[tokio::test]
    async fn test_get_server_info_without_validated_ledger() {
        let body = json!({
            "result": {"info": {"server_state": "connected"}, "status": "success"}
        });
        let (url, _server) = serve_once(body.to_string()).await;

        let http = HTTP::new(url);
        let info = http.get_server_info().await.unwrap();

        assert_eq!(info.validated_seq(), None);
        assert_eq!(info.server_state, "connected");
    }
}
