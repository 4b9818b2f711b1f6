use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::model::{Group, Member};
use crate::wire::{self, PositionReport};

/// Request/response half of the location backend.
#[async_trait]
pub trait LocationApi: Send + Sync {
    /// `GET /location/{identity}/{group_id}`
    async fn fetch_snapshot(&self, identity: &str, group_id: &str) -> crate::Result<Vec<Member>>;

    /// `POST /location/update`
    async fn report_position(&self, report: &PositionReport) -> crate::Result<()>;

    /// `GET /group/{identity}`
    async fn list_groups(&self, identity: &str) -> crate::Result<Vec<Group>>;
}

pub struct HttpBackend {
    client: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpBackend {
    pub fn new(base: Url, token: String) -> crate::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base,
            token,
        })
    }
}

#[async_trait]
impl LocationApi for HttpBackend {
    async fn fetch_snapshot(&self, identity: &str, group_id: &str) -> crate::Result<Vec<Member>> {
        let url = endpoint(&self.base, &["location", identity, group_id])?;
        debug!(%url, "fetching snapshot");
        let body = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(wire::decode_snapshot(&body)?)
    }

    async fn report_position(&self, report: &PositionReport) -> crate::Result<()> {
        let url = endpoint(&self.base, &["location", "update"])?;
        self.client
            .post(url)
            .bearer_auth(&self.token)
            .json(report)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn list_groups(&self, identity: &str) -> crate::Result<Vec<Group>> {
        let url = endpoint(&self.base, &["group", identity])?;
        let body = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(wire::decode_groups(&body)?)
    }
}

/// Appends percent-encoded path segments to `base`, keeping any path the
/// base already has.
pub fn endpoint(base: &Url, segments: &[&str]) -> crate::Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| crate::Error::BadEndpoint(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
