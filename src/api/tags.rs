use url::Url;

use super::Repository;
use crate::endpoint::Target;
use crate::error::{FormatError, Result};
use crate::models::TagList;
use crate::result::{ApiResult, json, result};
use crate::transport::Request;

/// Pagination for list endpoints: at most `n` entries after `last`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub n: Option<i64>,
    pub last: Option<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n(mut self, n: i64) -> Self {
        self.n = Some(n);
        self
    }

    pub fn last(mut self, last: impl Into<String>) -> Self {
        self.last = Some(last.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(Option<usize>, Option<String>)> {
        let n = match self.n {
            Some(n) => Some(
                usize::try_from(n)
                    .map_err(|_| FormatError::Argument(format!("\"n\" cannot be negative: {}", n)))?,
            ),
            None => None,
        };
        Ok((n, self.last.clone()))
    }

    pub(crate) fn apply(n: Option<usize>, last: Option<&str>, url: &mut Url) {
        if n.is_none() && last.is_none() {
            return;
        }
        let mut query = url.query_pairs_mut();
        if let Some(n) = n {
            query.append_pair("n", &n.to_string());
        }
        if let Some(last) = last {
            query.append_pair("last", last);
        }
    }
}

/// Tag listing of one repository.
#[derive(Debug, Clone, Copy)]
pub struct Tags<'a> {
    repo: &'a Repository,
}

impl<'a> Tags<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// `GET /v2/{name}/tags/list?n=&last=`. Tags come back in the order the
    /// registry sent them.
    pub async fn list(&self, options: ListOptions) -> Result<ApiResult<TagList>> {
        let (n, last) = options.validate()?;
        let mut url = self.repo.url("tags/list")?;
        ListOptions::apply(n, last.as_deref(), &mut url);

        let res = self
            .repo
            .send(Request::get(url), Target::TagsList { n, last })
            .await?;
        result(res, json::<TagList>)
    }
}
