use super::Repository;
use crate::digest::Digest;
use crate::endpoint::Target;
use crate::error::Result;
use crate::models::ImageIndex;
use crate::result::{ApiResult, json, result};
use crate::transport::Request;

/// Referrers listing of one repository.
#[derive(Debug, Clone, Copy)]
pub struct Referrers<'a> {
    repo: &'a Repository,
}

impl<'a> Referrers<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// `GET /v2/{name}/referrers/{digest}?artifactType=`. The registry
    /// answers with an image index of the manifests that refer to `digest`.
    pub async fn get(&self, digest: &Digest, artifact_type: Option<&str>) -> Result<ApiResult<ImageIndex>> {
        let mut url = self.repo.url(&format!("referrers/{}", digest))?;
        if let Some(artifact_type) = artifact_type {
            url.query_pairs_mut()
                .append_pair("artifactType", artifact_type);
        }

        let res = self
            .repo
            .send(Request::get(url), Target::Referrers {
                digest: digest.clone(),
                artifact_type: artifact_type.map(str::to_string),
            })
            .await?;
        result(res, json::<ImageIndex>)
    }
}
