//! Textual request headers sent ahead of the audio payload and with the
//! end-of-session status message.

use std::fmt::Write;

/// Who is talking to which collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorRequest {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub firmware_version: u32,
}

impl CollectorRequest {
    fn preamble(&self, out: &mut String, accept: &str) {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "POST /write?db=AudioData HTTP/1.1\r\n\
             User-Agent: {}\r\n\
             Host: {}:{}\r\n\
             Accept: {}\r\n\
             Connection: keep-alive\r\n",
            self.device_id, self.host, self.port, accept
        );
    }

    /// Header that opens an audio stream.  Raw compressed bytes follow it
    /// with no length prefix.
    ///
    /// ```rust
    /// use acoustic_node::stream::CollectorRequest;
    ///
    /// let req = CollectorRequest {
    ///     device_id: "node-1".into(),
    ///     host: "collector.local".into(),
    ///     port: 8080,
    ///     firmware_version: 3,
    /// };
    /// let header = req.stream_header();
    /// assert!(header.starts_with("POST /write?db=AudioData HTTP/1.1\r\n"));
    /// assert!(header.contains("Accept: fw_3\r\n"));
    /// assert!(header.ends_with("\r\n\r\n"));
    /// ```
    pub fn stream_header(&self) -> String {
        let mut out = String::with_capacity(256);
        self.preamble(&mut out, &format!("fw_{}", self.firmware_version));
        out.push_str("Content-Type: application/x-www-form-urlencoded\r\n");
        out.push_str("Content-Length: \r\n\r\n");
        out
    }

    /// Complete end-of-session status message carrying `payload`.
    pub fn status_message(&self, payload: &str) -> String {
        let mut out = String::with_capacity(256);
        self.preamble(&mut out, " */*");
        out.push_str("Content-Type: text/plain\r\n");
        out.push_str("Content-Length: \r\n\r\n");
        out.push_str(payload);
        out.push_str("\r\n\r\n");
        out
    }
}
