use std::fs::File;
use std::io::copy;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use tempfile::NamedTempFile;
use url::Url;

use super::{Credentials, FetchResponse, ProbeStatus, Transport};

pub struct HttpTransport {
    scheme: &'static str,
    client: Client,
    credentials: Option<Credentials>,
}

impl HttpTransport {
    pub fn new(scheme: &'static str, credentials: Option<Credentials>) -> Result<Self> {
        Ok(Self {
            scheme,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .context("building HTTP client")?,
            credentials,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }
}

impl Transport for HttpTransport {
    fn scheme(&self) -> &'static str {
        self.scheme
    }

    fn probe(&self, url: &Url) -> Result<ProbeStatus> {
        match self.authorize(self.client.head(url.clone())).send() {
            Ok(response) => Ok(ProbeStatus::Status(response.status().as_u16())),
            Err(err) if err.is_connect() || err.is_timeout() => {
                tracing::debug!(%url, error = %err, "probe target unreachable");
                Ok(ProbeStatus::Unreachable)
            }
            Err(err) => Err(err).with_context(|| format!("failed to probe {url}")),
        }
    }

    fn fetch(&self, url: &Url) -> Result<Option<FetchResponse>> {
        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .with_context(|| format!("failed to download {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let mut response = response
            .error_for_status()
            .with_context(|| format!("download failed {url}"))?;

        let mut temp = NamedTempFile::new().context("failed to allocate temp file for download")?;
        {
            let mut writer = temp.as_file_mut();
            copy(&mut response, &mut writer).context("failed to stream HTTP content")?;
        }
        Ok(Some(FetchResponse::from_temp(temp.into_temp_path())))
    }

    fn publish(&self, url: &Url, source: &Path) -> Result<()> {
        let file = File::open(source)
            .with_context(|| format!("failed to open {} for upload", source.display()))?;
        let response = self
            .authorize(self.client.put(url.clone()).body(file))
            .send()
            .with_context(|| format!("failed to upload to {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("upload to {url} rejected with status {status}");
        }
        Ok(())
    }
}
