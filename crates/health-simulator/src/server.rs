//! Blocking HTTP server serving the same routes as the firmware.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use health_core::http::{MAX_REQUEST_SIZE, handle_request, request_complete};
use health_core::store::LatestReading;
use log::{debug, info, warn};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept connections forever, one request per connection.
pub fn serve(listener: TcpListener, store: &LatestReading) {
    info!("HTTP server listening on http://{}", listener_addr(&listener));
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                if let Err(e) = handle_connection(stream, store) {
                    warn!("Connection failed: {}", e);
                }
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }
}

fn listener_addr(listener: &TcpListener) -> String {
    listener
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "<unknown>".into())
}

fn handle_connection(mut stream: TcpStream, store: &LatestReading) -> io::Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut buf = [0u8; MAX_REQUEST_SIZE];
    let mut len = 0;
    while len < buf.len() && !request_complete(&buf[..len]) {
        let n = stream.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    if len == 0 {
        return Ok(());
    }

    let response = handle_request(&buf[..len], store);
    debug!("{} bytes in, status {}", len, response.status.code());

    stream.write_all(response.head().as_bytes())?;
    stream.write_all(response.body())?;
    stream.flush()
}
