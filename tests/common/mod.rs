#![allow(dead_code)]

use std::io::{Cursor, Read as _, Write as _};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use zip::write::SimpleFileOptions;

/// 1x1 grayscale PNG.
pub static PIXEL_PNG: &[u8] = &[
    137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13, 73, 72, 68, 82, 0, 0, 0, 1, 0, 0, 0, 1, 8, 4, 0,
    0, 0, 181, 28, 12, 2, 0, 0, 0, 11, 73, 68, 65, 84, 120, 218, 99, 252, 255, 23, 0, 2, 3, 1, 128,
    110, 220, 25, 0, 0, 0, 0, 73, 69, 78, 68, 174, 66, 96, 130,
];

/// Builds EPUB 3 containers in memory. Chapters land in `OEBPS/Text/`,
/// images in `OEBPS/Images/`, and the spine follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct EpubFixture {
    title: Option<String>,
    author: Option<String>,
    documents: Vec<(String, String)>,
    images: Vec<(String, Vec<u8>)>,
}

impl EpubFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_owned());
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_owned());
        self
    }

    /// `body` is the inner HTML of `<body>`.
    pub fn chapter(mut self, file_name: &str, body: &str) -> Self {
        self.documents
            .push((file_name.to_owned(), body.to_owned()));
        self
    }

    pub fn image(mut self, file_name: &str, bytes: &[u8]) -> Self {
        self.images.push((file_name.to_owned(), bytes.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default();

        zip.start_file("mimetype", stored).expect("start mimetype");
        zip.write_all(b"application/epub+zip").expect("write mimetype");

        zip.start_file("META-INF/container.xml", deflated)
            .expect("start container");
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#,
        )
        .expect("write container");

        zip.start_file("OEBPS/content.opf", deflated)
            .expect("start opf");
        zip.write_all(self.opf().as_bytes()).expect("write opf");

        for (name, body) in &self.documents {
            zip.start_file(format!("OEBPS/Text/{name}"), deflated)
                .expect("start chapter");
            let xhtml = format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>{name}</title></head>
<body>
{body}
</body>
</html>"#
            );
            zip.write_all(xhtml.as_bytes()).expect("write chapter");
        }
        for (name, bytes) in &self.images {
            zip.start_file(format!("OEBPS/Images/{name}"), stored)
                .expect("start image");
            zip.write_all(bytes).expect("write image");
        }

        zip.finish().expect("finish zip").into_inner()
    }

    pub fn write_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        std::fs::write(path, self.build())?;
        Ok(())
    }

    fn opf(&self) -> String {
        let mut metadata = String::new();
        if let Some(title) = &self.title {
            metadata.push_str(&format!("    <dc:title>{title}</dc:title>\n"));
        }
        if let Some(author) = &self.author {
            metadata.push_str(&format!("    <dc:creator>{author}</dc:creator>\n"));
        }

        let mut manifest = String::new();
        let mut spine = String::new();
        for (i, (name, _)) in self.documents.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"doc{i}\" href=\"Text/{name}\" media-type=\"application/xhtml+xml\"/>\n"
            ));
            spine.push_str(&format!("    <itemref idref=\"doc{i}\"/>\n"));
        }
        for (i, (name, _)) in self.images.iter().enumerate() {
            let media_type = if name.ends_with(".png") {
                "image/png"
            } else {
                "image/jpeg"
            };
            manifest.push_str(&format!(
                "    <item id=\"img{i}\" href=\"Images/{name}\" media-type=\"{media_type}\"/>\n"
            ));
        }

        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:fixture</dc:identifier>
{metadata}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine>
{spine}  </spine>
</package>"#
        )
    }
}

/// A canned response from [`StubServer`].
pub struct StubResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn ok(content_type: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            content_type,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.as_bytes().to_vec(),
        }
    }
}

/// A request as seen by [`StubServer`] handlers.
pub struct StubRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

/// Serves `handler` on a random local port until dropped.
pub struct StubServer {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StubServer {
    pub fn spawn<F>(handler: F) -> Self
    where
        F: Fn(&StubRequest) -> StubResponse + Send + 'static,
    {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start stub server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let authorization = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Authorization"))
                    .map(|h| h.value.to_string());
                let seen = StubRequest {
                    method: request.method().to_string(),
                    url: request.url().to_owned(),
                    authorization,
                    body,
                };

                let reply = handler(&seen);
                let header =
                    tiny_http::Header::from_bytes(&b"Content-Type"[..], reply.content_type.as_bytes())
                        .expect("build header");
                let response = tiny_http::Response::from_data(reply.body)
                    .with_status_code(reply.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
