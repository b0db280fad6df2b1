#[cfg(test)]
pub mod http {
    //! Minimal blocking HTTP fixtures bound to 127.0.0.1.

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::path::Path;
    use std::process::{Command, Stdio};
    use std::sync::mpsc::{self, Receiver};
    use std::thread;
    use std::time::Duration;

    /// A parsed request as seen by the fixture server.
    #[derive(Debug, Clone)]
    pub struct Request {
        pub method: String,
        pub target: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl Request {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }
    }

    fn read_request(stream: &TcpStream) -> Option<Request> {
        let mut reader = BufReader::new(stream.try_clone().ok()?);
        let mut line = String::new();
        reader.read_line(&mut line).ok()?;
        let mut parts = line.split_whitespace();
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();

        let mut headers = Vec::new();
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).ok()?;
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            let (key, value) = header.split_once(':')?;
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }

        let mut request = Request { method, target, headers, body: Vec::new() };
        if let Some(len) = request.header("content-length").and_then(|v| v.parse().ok()) {
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).ok()?;
            request.body = body;
        } else if request
            .header("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked"))
        {
            loop {
                let mut size_line = String::new();
                reader.read_line(&mut size_line).ok()?;
                let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
                let mut chunk = vec![0u8; size + 2];
                reader.read_exact(&mut chunk).ok()?;
                if size == 0 {
                    break;
                }
                request.body.extend_from_slice(&chunk[..size]);
            }
        }
        Some(request)
    }

    fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture server");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));
        (listener, base)
    }

    /// Accepts connections and never answers. Returns the base URL.
    pub fn stalled_server() -> String {
        let (listener, base) = bind();
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        base
    }

    /// Answers one request with `status` and `body`, after sending `body` in two halves
    /// separated by `pause`. The received request is delivered on the returned channel.
    pub fn one_shot(status: u16, body: Vec<u8>, pause: Duration) -> (String, Receiver<Request>) {
        let (listener, base) = bind();
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let Some(request) = read_request(&stream) else {
                return;
            };
            let _ = tx.send(request);

            let head = format!(
                "HTTP/1.1 {status} Fixture\r\nContent-Type: application/zip\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let split = body.len() / 2;
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body[..split]);
            let _ = stream.flush();
            thread::sleep(pause);
            let _ = stream.write_all(&body[split..]);
        });
        (base, rx)
    }

    /// Whether a `git` executable is on PATH.
    pub fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Serve every repository under `project_root` over smart HTTP via `git http-backend`.
    pub fn git_http_server(project_root: &Path) -> String {
        let (listener, base) = bind();
        let root = project_root.to_path_buf();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let root = root.clone();
                thread::spawn(move || serve_cgi(stream, &root));
            }
        });
        base
    }

    fn serve_cgi(mut stream: TcpStream, root: &Path) {
        let Some(request) = read_request(&stream) else {
            return;
        };
        let (path, query) = request.target.split_once('?').unwrap_or((&request.target, ""));

        let mut command = Command::new("git");
        command
            .arg("http-backend")
            .env_remove("GIT_DIR")
            .env("GIT_PROJECT_ROOT", root)
            .env("GIT_HTTP_EXPORT_ALL", "1")
            .env("REQUEST_METHOD", &request.method)
            .env("PATH_INFO", path)
            .env("QUERY_STRING", query)
            .env("REMOTE_ADDR", "127.0.0.1")
            .env("CONTENT_LENGTH", request.body.len().to_string())
            .env("CONTENT_TYPE", request.header("content-type").unwrap_or(""))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(protocol) = request.header("git-protocol") {
            command.env("GIT_PROTOCOL", protocol);
        }

        let Ok(mut child) = command.spawn() else {
            return;
        };
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&request.body);
        }
        let Ok(output) = child.wait_with_output() else {
            return;
        };

        let raw = output.stdout;
        let (header_end, sep_len) = match raw.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(pos) => (pos, 4),
            None => match raw.windows(2).position(|w| w == b"\n\n") {
                Some(pos) => (pos, 2),
                None => return,
            },
        };
        let cgi_head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let body = &raw[header_end + sep_len..];

        let mut status = "200 OK".to_string();
        let mut headers = String::new();
        for line in cgi_head.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.split_once(':') {
                Some((key, value)) if key.eq_ignore_ascii_case("status") => {
                    status = value.trim().to_string();
                }
                _ => {
                    headers.push_str(line);
                    headers.push_str("\r\n");
                }
            }
        }

        let head = format!(
            "HTTP/1.1 {status}\r\n{headers}Content-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body);
        let _ = stream.flush();
    }
}
