/// Protocol name and version written on every status line.
pub const PROTOCOL_VERSION: &str = "RTSP/1.0";

/// Reply status codes understood by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    NotFound,
    ServerError,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NotFound => 404,
            Self::ServerError => 500,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT FOUND",
            Self::ServerError => "INTERNAL SERVER ERROR",
        }
    }
}

/// A control-channel reply.
///
/// Serializes to:
///
/// ```text
/// RTSP/1.0 200 OK
/// CSeq: 2
/// Session: 123456
/// Content-Type: text/plain
/// Content-Length: 11
///
/// a.dat
/// b.dat
/// ```
///
/// Clients read the session id from the third line, so `Session` always
/// directly follows `CSeq`. The content headers appear only with a body.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub cseq: u32,
    pub session_id: Option<u32>,
    pub body: Option<String>,
}

impl Response {
    pub fn new(status: StatusCode, cseq: u32) -> Self {
        Response {
            status,
            cseq,
            session_id: None,
            body: None,
        }
    }

    pub fn ok(cseq: u32) -> Self {
        Self::new(StatusCode::Ok, cseq)
    }

    pub fn not_found(cseq: u32) -> Self {
        Self::new(StatusCode::NotFound, cseq)
    }

    pub fn server_error(cseq: u32) -> Self {
        Self::new(StatusCode::ServerError, cseq)
    }

    pub fn with_session(mut self, session_id: Option<u32>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize to the text wire format.
    pub fn serialize(&self) -> String {
        let mut response = format!(
            "{} {} {}\nCSeq: {}\n",
            PROTOCOL_VERSION,
            self.status.code(),
            self.status.reason(),
            self.cseq
        );

        if let Some(id) = self.session_id {
            response.push_str(&format!("Session: {}\n", id));
        }

        match &self.body {
            Some(body) => {
                response.push_str("Content-Type: text/plain\n");
                response.push_str(&format!("Content-Length: {}\n\n", body.len()));
                response.push_str(body);
            }
            None => response.push('\n'),
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_ok_with_session() {
        let s = Response::ok(3).with_session(Some(123456)).serialize();
        assert_eq!(s, "RTSP/1.0 200 OK\nCSeq: 3\nSession: 123456\n\n");

        let lines: Vec<&str> = s.split('\n').collect();
        assert_eq!(lines[2].split(' ').nth(1), Some("123456"));
    }

    #[test]
    fn serialize_not_found_without_session() {
        let s = Response::not_found(1).serialize();
        assert_eq!(s, "RTSP/1.0 404 NOT FOUND\nCSeq: 1\n\n");
    }

    #[test]
    fn serialize_server_error() {
        let s = Response::server_error(8).serialize();
        assert!(s.starts_with("RTSP/1.0 500 INTERNAL SERVER ERROR\n"));
    }

    #[test]
    fn serialize_with_body() {
        let s = Response::ok(1)
            .with_body("a.dat\nb.dat".to_string())
            .serialize();
        assert_eq!(
            s,
            "RTSP/1.0 200 OK\nCSeq: 1\nContent-Type: text/plain\nContent-Length: 11\n\na.dat\nb.dat"
        );
    }

    #[test]
    fn serialize_empty_body_keeps_content_headers() {
        let s = Response::ok(1).with_body(String::new()).serialize();
        assert!(s.ends_with("Content-Length: 0\n\n"));
    }
}
