//! Local HTTP callback server for browser sign-in.
//!
//! Listens on localhost for the single redirect that carries the
//! authorization code, answers with a small page, and hands the full
//! callback URL back to the caller.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AuthError;

/// Redirect URI registered for the app at the given port.
pub fn redirect_uri(port: u16) -> String {
    format!("http://localhost:{}/callback", port)
}

/// Bind the callback listener. Port 0 picks a free port.
pub async fn bind(port: u16) -> Result<TcpListener, AuthError> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AuthError::OAuthFailed(format!("Failed to start callback server on {}: {}", addr, e)))?;
    info!("OAuth callback server listening on {}", addr);
    Ok(listener)
}

/// Wait for one OAuth callback on `listener`.
///
/// Requests that aren't a callback get an error response and the server keeps
/// listening. Returns [`AuthError::UserCancelled`] once `cancel` fires.
pub async fn wait_for_callback(
    listener: TcpListener,
    cancel: CancellationToken,
) -> Result<String, AuthError> {
    let port = listener
        .local_addr()
        .map(|addr| addr.port())
        .map_err(|e| AuthError::OAuthFailed(e.to_string()))?;

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Callback server cancelled");
                return Err(AuthError::UserCancelled);
            }
            accepted = listener.accept() => {
                accepted.map_err(|e| AuthError::OAuthFailed(format!("Connection error: {}", e)))?
            }
        };

        debug!("Connection from {}", peer);
        if let Some(path) = handle_connection(stream).await {
            info!("OAuth callback received");
            return Ok(format!("http://localhost:{}{}", port, path));
        }
    }
}

/// Returns the request path if this was a callback.
async fn handle_connection(mut stream: TcpStream) -> Option<String> {
    let mut buffer = [0u8; 4096];
    let read = tokio::time::timeout(std::time::Duration::from_secs(5), stream.read(&mut buffer)).await;
    let bytes_read = match read {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            debug!("Failed to read request: {}", e);
            return None;
        }
        Err(_) => {
            debug!("Timed out reading callback request");
            return None;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);
    let mut parts = request.lines().next()?.split_whitespace();
    let (method, path) = match (parts.next(), parts.next()) {
        (Some(method), Some(path)) => (method, path.to_string()),
        _ => {
            respond(&mut stream, "400 Bad Request", "Bad Request").await;
            return None;
        }
    };

    if method != "GET" {
        respond(&mut stream, "405 Method Not Allowed", "Method Not Allowed").await;
        return None;
    }
    if !path.starts_with("/callback") {
        respond(&mut stream, "404 Not Found", "Not Found").await;
        return None;
    }

    if path.contains("error=") {
        warn!("Sign-in callback carried an error");
        respond_html(&mut stream, "Sign-in failed", "You can close this tab and try again.").await;
        return Some(path);
    }
    if !path.contains("code=") {
        respond(&mut stream, "400 Bad Request", "Missing authorization code").await;
        return None;
    }

    respond_html(&mut stream, "Signed in", "You can close this tab and return to the terminal.").await;
    Some(path)
}

async fn respond_html(stream: &mut TcpStream, title: &str, message: &str) {
    let html = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{0}</title></head>\
         <body style=\"font-family:sans-serif;text-align:center;margin-top:4rem\">\
         <h1>{0}</h1><p>{1}</p></body></html>",
        title, message
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        html.len(),
        html
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}

async fn respond(stream: &mut TcpStream, status: &str, message: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        message.len(),
        message
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}
