//! Host identification.

use reqwest::blocking::Client;
use std::time::Duration;

const EC2_INSTANCE_ID_URL: &str = "http://169.254.169.254/latest/meta-data/instance-id";

/// Ask the EC2 metadata service for this instance's id.
///
/// Returns `None` off EC2 or when the service does not answer within a
/// second.
pub fn ec2_instance_id() -> Option<String> {
    instance_id_from(EC2_INSTANCE_ID_URL, Duration::from_secs(1))
}

fn instance_id_from(url: &str, timeout: Duration) -> Option<String> {
    let client = match Client::builder().timeout(timeout).build() {
        Ok(c) => c,
        Err(e) => {
            warn!("could not build metadata client: {}", e);
            return None;
        }
    };
    let response = match client.get(url).send() {
        Ok(r) => r,
        Err(e) => {
            info!("EC2 metadata service unavailable: {}", e);
            return None;
        }
    };
    if !response.status().is_success() {
        info!("EC2 metadata service answered {}", response.status());
        return None;
    }
    match response.text() {
        Ok(body) => {
            let id = body.trim();
            if id.is_empty() {
                None
            } else {
                Some(id.to_string())
            }
        }
        Err(e) => {
            info!("could not read EC2 instance id: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn reads_id_from_metadata_service() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0; 1024];
            let _ = stream.read(&mut buf).unwrap();
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 11\r\nconnection: close\r\n\r\ni-abc123de\n")
                .unwrap();
        });
        let url = format!("http://{}/latest/meta-data/instance-id", addr);
        assert_eq!(
            Some("i-abc123de".to_string()),
            instance_id_from(&url, Duration::from_secs(5))
        );
        server.join().unwrap();
    }

    #[test]
    fn unreachable_service_is_none() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = format!("http://{}/", addr);
        assert_eq!(None, instance_id_from(&url, Duration::from_millis(500)));
    }
}
