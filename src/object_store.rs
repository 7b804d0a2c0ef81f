use async_trait::async_trait;

/// Durable storage for session auth directories. Modeled as a
/// trait so the REST-backed implementation below can be swapped for another
/// backend without touching the Session Storage Service that calls it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), String>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;
    async fn exists(&self, key: &str) -> Result<bool, String>;
    async fn delete(&self, key: &str) -> Result<(), String>;
}

/// REST-backed object store built on the same `reqwest::Client` + bearer
/// header pattern used for outbound webhook delivery, here a typed adapter:
/// `PUT /{bucket}/{key}`, `GET /{bucket}/{key}`, `DELETE /{bucket}/{key}`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: String, bucket: String, service_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            bucket,
            service_key,
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), self.bucket, key)
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), String> {
        let req = self.apply_auth(self.client.put(self.url_for(key))).body(data);
        let resp = req.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("object store PUT {key} failed: HTTP {}", resp.status()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String> {
        let req = self.apply_auth(self.client.get(self.url_for(key)));
        let resp = req.send().await.map_err(|e| e.to_string())?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(format!("object store GET {key} failed: HTTP {}", resp.status()));
        }
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(Some(bytes.to_vec()))
    }

    async fn exists(&self, key: &str) -> Result<bool, String> {
        let req = self.apply_auth(self.client.head(self.url_for(key)));
        let resp = req.send().await.map_err(|e| e.to_string())?;
        Ok(resp.status().is_success())
    }

    async fn delete(&self, key: &str) -> Result<(), String> {
        let req = self.apply_auth(self.client.delete(self.url_for(key)));
        let resp = req.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(format!("object store DELETE {key} failed: HTTP {}", resp.status()));
        }
        Ok(())
    }
}
