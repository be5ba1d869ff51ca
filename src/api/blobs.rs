use bytes::Bytes;
use reqwest::header::{self, HeaderValue};
use reqwest::{Method, StatusCode};
use url::Url;

use super::{OCI_CHUNK_MIN_LENGTH, Repository, location};
use crate::digest::Digest;
use crate::endpoint::Target;
use crate::error::{FormatError, ResError, Result};
use crate::range::Range;
use crate::result::{ApiResult, Probe, content_digest, empty, probe, result};
use crate::transport::{Request, Response};
use crate::upload::{MAX_CHUNK_SIZE, UploadSession};

fn octet_stream() -> HeaderValue {
    HeaderValue::from_static("application/octet-stream")
}

/// A freshly opened upload session.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadInit {
    pub location: Url,
    /// Smallest chunk the registry accepts, from `OCI-Chunk-Min-Length`.
    pub chunk_min_length: Option<usize>,
}

/// Where an upload session stands after a chunk or a status query.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadProgress {
    pub location: Url,
    /// Bytes the registry holds, from the `Range` header.
    pub range: Option<Range>,
}

/// A completed blob upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Uploaded {
    pub location: Url,
    pub digest: Digest,
}

/// Outcome of a cross-repository mount request.
#[derive(Debug, Clone, PartialEq)]
pub struct Mounted {
    pub location: Url,
    /// `false` when the registry declined to mount and opened an upload
    /// session at `location` instead.
    pub mounted: bool,
}

/// Blob endpoints of one repository.
#[derive(Debug, Clone, Copy)]
pub struct Blobs<'a> {
    repo: &'a Repository,
}

impl<'a> Blobs<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    fn blob_url(&self, digest: &Digest) -> Result<Url> {
        self.repo.url(&format!("blobs/{}", digest))
    }

    fn uploads_url(&self) -> Result<Url> {
        self.repo.url("blobs/uploads/")
    }

    /// `HEAD /v2/{name}/blobs/{digest}`
    pub async fn exists(&self, digest: &Digest) -> Result<Probe> {
        let url = self.blob_url(digest)?;
        let res = self
            .repo
            .send(Request::new(Method::HEAD, url), Target::Blob {
                digest: digest.clone(),
            })
            .await?;
        probe(res)
    }

    /// `GET /v2/{name}/blobs/{digest}`
    pub async fn get(&self, digest: &Digest) -> Result<ApiResult<Bytes>> {
        let url = self.blob_url(digest)?;
        let res = self
            .repo
            .send(Request::get(url), Target::Blob {
                digest: digest.clone(),
            })
            .await?;
        result(res, |res| Ok(res.body().clone()))
    }

    /// `DELETE /v2/{name}/blobs/{digest}`
    pub async fn delete(&self, digest: &Digest) -> Result<ApiResult<()>> {
        let url = self.blob_url(digest)?;
        let res = self
            .repo
            .send(Request::new(Method::DELETE, url), Target::BlobDelete {
                digest: digest.clone(),
            })
            .await?;
        result(res, empty)
    }

    /// `POST /v2/{name}/blobs/uploads/`
    pub async fn init_upload(&self) -> Result<ApiResult<UploadInit>> {
        let url = self.uploads_url()?;
        let res = self
            .repo
            .send(Request::new(Method::POST, url), Target::UploadInit { digest: None })
            .await?;
        let base = self.repo.base().clone();
        result(res, move |res| {
            Ok(UploadInit {
                location: location(&base, res)?,
                chunk_min_length: chunk_min_length(res)?,
            })
        })
    }

    /// `PATCH {location}` with `data` placed at `offset`.
    pub async fn upload_chunk(
        &self,
        at: &Url,
        offset: u64,
        data: Bytes,
    ) -> Result<ApiResult<UploadProgress>> {
        let range = Range::span(offset, data.len() as u64)?;
        let content_range = HeaderValue::from_str(&range.to_string())
            .map_err(|_| FormatError::Range(range.to_string()))?;
        let request = Request::new(Method::PATCH, at.clone())
            .with_header(header::CONTENT_RANGE, content_range)
            .with_header(header::CONTENT_TYPE, octet_stream())
            .with_body(data);
        let res = self
            .repo
            .send(request, Target::UploadSession {
                location: at.clone(),
            })
            .await?;
        let base = self.repo.base().clone();
        result(res, move |res| progress(&base, res))
    }

    /// `PUT {location}?digest={digest}`, optionally carrying a last chunk.
    pub async fn close_upload(
        &self,
        at: &Url,
        digest: &Digest,
        data: Option<Bytes>,
    ) -> Result<ApiResult<Uploaded>> {
        let mut url = at.clone();
        url.query_pairs_mut()
            .append_pair("digest", &digest.to_string());

        let mut request = Request::new(Method::PUT, url);
        if let Some(data) = data {
            request = request
                .with_header(header::CONTENT_TYPE, octet_stream())
                .with_body(data);
        }
        let res = self
            .repo
            .send(request, Target::UploadClose {
                digest: digest.clone(),
            })
            .await?;
        let base = self.repo.base().clone();
        let digest = digest.clone();
        result(res, move |res| uploaded(&base, res, &digest))
    }

    /// `GET {location}`
    pub async fn upload_status(&self, at: &Url) -> Result<ApiResult<UploadProgress>> {
        let res = self
            .repo
            .send(Request::get(at.clone()), Target::UploadSession {
                location: at.clone(),
            })
            .await?;
        let base = self.repo.base().clone();
        result(res, move |res| progress(&base, res))
    }

    /// Push `data` in a single `POST /v2/{name}/blobs/uploads/?digest=`.
    pub async fn upload(&self, digest: &Digest, data: Bytes) -> Result<ApiResult<Uploaded>> {
        let mut url = self.uploads_url()?;
        url.query_pairs_mut()
            .append_pair("digest", &digest.to_string());
        let request = Request::new(Method::POST, url)
            .with_header(header::CONTENT_TYPE, octet_stream())
            .with_body(data);
        let res = self
            .repo
            .send(request, Target::UploadInit {
                digest: Some(digest.clone()),
            })
            .await?;
        let base = self.repo.base().clone();
        let digest = digest.clone();
        result(res, move |res| uploaded(&base, res, &digest))
    }

    /// Ask the registry to mount `digest` from repository `from` instead of
    /// uploading it again.
    pub async fn mount(&self, digest: &Digest, from: Option<&str>) -> Result<ApiResult<Mounted>> {
        let mut url = self.uploads_url()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("mount", &digest.to_string());
            if let Some(from) = from {
                query.append_pair("from", from);
            }
        }
        let res = self
            .repo
            .send(Request::new(Method::POST, url), Target::Mount {
                mount: digest.clone(),
                from: from.map(str::to_string),
            })
            .await?;
        let base = self.repo.base().clone();
        result(res, move |res| {
            Ok(Mounted {
                location: location(&base, res)?,
                mounted: res.status() == StatusCode::CREATED,
            })
        })
    }

    /// Open a chunked upload session.
    pub async fn upload_session(&self) -> Result<UploadSession> {
        let init = self.init_upload().await?.unwrap()?.into_value();
        Ok(UploadSession::start(self.repo.clone(), init))
    }

    /// Push `data`, in one request when it fits in a chunk and through an
    /// upload session otherwise.
    pub async fn push(&self, data: Bytes) -> Result<Uploaded> {
        let digest = Digest::sha256(&data);
        if data.len() <= self.repo.chunk_size() {
            return Ok(self.upload(&digest, data).await?.unwrap()?.into_value());
        }

        let session = self.upload_session().await?;
        session.write_bytes(data).await?;
        session.close().await
    }
}

fn progress(base: &Url, res: &Response) -> Result<UploadProgress> {
    Ok(UploadProgress {
        location: location(base, res)?,
        range: res
            .header(header::RANGE)
            .and_then(|v| Range::parse(v).ok()),
    })
}

fn chunk_min_length(res: &Response) -> Result<Option<usize>> {
    let Some(value) = res.header(OCI_CHUNK_MIN_LENGTH) else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(n) if n > MAX_CHUNK_SIZE => Err(ResError::new(
            res.clone(),
            format!("chunk minimum length {} exceeds {}", n, MAX_CHUNK_SIZE),
        )
        .into()),
        Ok(n) => Ok(Some(n)),
        Err(_) => Ok(None),
    }
}

fn uploaded(base: &Url, res: &Response, digest: &Digest) -> Result<Uploaded> {
    Ok(Uploaded {
        location: location(base, res)?,
        digest: content_digest(res).unwrap_or_else(|| digest.clone()),
    })
}
