use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use super::{AssetStatus, RemoteError, RemoteHost, Result, UploadTarget};

/// `RemoteHost` over a Vimeo-shaped HTTP API with bearer-token auth.
#[derive(Debug, Clone)]
pub struct HttpRemoteHost {
    http: Client,
    api_base: String,
    player_base: String,
    thumbnail_base: String,
    token: String,
}

impl HttpRemoteHost {
    pub fn new(
        api_base: impl Into<String>,
        player_base: impl Into<String>,
        thumbnail_base: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into(),
            player_base: player_base.into(),
            thumbnail_base: thumbnail_base.into(),
            token: token.into(),
        }
    }

    /// The API identifies assets by a URI like `/videos/12345`.
    fn parse_asset_id(uri: &str) -> Result<String> {
        uri.rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.to_string())
            .ok_or(RemoteError::MissingField("uri"))
    }

    async fn api_error(response: reqwest::Response) -> RemoteError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        RemoteError::api(status, message)
    }
}

#[async_trait]
impl RemoteHost for HttpRemoteHost {
    async fn create_upload(
        &self,
        size: u64,
        title: &str,
        description: &str,
    ) -> Result<UploadTarget> {
        let body = json!({
            "upload": {
                "approach": "tus",
                "size": size.to_string(),
            },
            "name": title,
            "description": description,
            "privacy": {
                "view": "anybody",
                "embed": "public",
            },
        });

        let response = self
            .http
            .post(format!("{}/me/videos", self.api_base))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpRemoteHost::api_error(response).await);
        }

        let payload: serde_json::Value = response.json().await?;
        let upload_url = payload
            .pointer("/upload/upload_link")
            .and_then(|value| value.as_str())
            .ok_or(RemoteError::MissingField("upload.upload_link"))?
            .to_string();
        let uri = payload
            .get("uri")
            .and_then(|value| value.as_str())
            .ok_or(RemoteError::MissingField("uri"))?;

        Ok(UploadTarget {
            upload_url,
            asset_id: HttpRemoteHost::parse_asset_id(uri)?,
        })
    }

    async fn asset_status(&self, asset_id: &str) -> Result<AssetStatus> {
        let response = self
            .http
            .get(format!("{}/videos/{}", self.api_base, asset_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(HttpRemoteHost::api_error(response).await);
        }

        let payload: serde_json::Value = response.json().await?;
        let duration_secs = payload
            .get("duration")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);
        let thumbnail_url = payload
            .pointer("/pictures/base_link")
            .and_then(|value| value.as_str())
            .map(|link| link.to_string());

        Ok(AssetStatus {
            asset_id: asset_id.to_string(),
            duration_secs,
            thumbnail_url,
        })
    }

    async fn delete_asset(&self, asset_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}/videos/{}", self.api_base, asset_id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(HttpRemoteHost::api_error(response).await);
        }

        Ok(())
    }

    fn playback_url(&self, asset_id: &str) -> String {
        format!("{}/video/{}", self.player_base, asset_id)
    }

    fn thumbnail_url(&self, asset_id: &str) -> String {
        format!("{}/{}.jpg", self.thumbnail_base, asset_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_from_uri() {
        assert_eq!(HttpRemoteHost::parse_asset_id("/videos/12345").unwrap(), "12345");
        assert!(HttpRemoteHost::parse_asset_id("/videos/").is_err());
    }

    #[test]
    fn test_url_conventions() {
        let host = HttpRemoteHost::new(
            "https://api.example.com",
            "https://player.example.com",
            "https://vumbnail.com",
            "token",
        );

        assert_eq!(host.playback_url("42"), "https://player.example.com/video/42");
        assert_eq!(host.thumbnail_url("42"), "https://vumbnail.com/42.jpg");
    }
}
