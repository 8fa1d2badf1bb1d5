//! This module contains the code specific for the schema registry.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT};
use reqwest::{header, RequestBuilder, Response};
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;

use crate::error::{ErrorKind, SRCError};
use crate::schema_registry_common::{
    url_for_call, RawError, RawRegisteredSchema, RegisteredSchema, SrAuthorization, SrCall,
    SubjectVersion,
};

/// The calls the cache needs from a schema registry. [SrSettings] implements them using the REST
/// api of the Confluent schema registry.
#[async_trait]
pub trait SchemaRegistryClient: Send + Sync {
    /// All the subjects known to the registry.
    async fn list_subjects(&self) -> Result<Vec<String>, SRCError>;
    /// All the versions of the subject.
    async fn list_versions(&self, subject: &str) -> Result<Vec<u32>, SRCError>;
    async fn get_schema(&self, subject: &str, version: u32) -> Result<RegisteredSchema, SRCError>;
    async fn get_latest_schema(&self, subject: &str) -> Result<RegisteredSchema, SRCError>;
    /// Gets a schema by an id, the response doesn't contain the subject or version.
    async fn get_schema_by_id(&self, id: u32) -> Result<RegisteredSchema, SRCError>;
    /// All the subject and version combinations the id is registered under.
    async fn get_subject_versions_for_id(&self, id: u32)
        -> Result<Vec<SubjectVersion>, SRCError>;
}

/// Settings used to do the calls to schema registry. For simple cases you can use `SrSettings::new`
/// or the `SrSettingsBuilder`. But you can also use it directly so you can all the available
/// settings from reqwest.
#[derive(Debug, Clone)]
pub struct SrSettings {
    urls: Vec<String>,
    client: Client,
    authorization: SrAuthorization,
}

/// Struct to create an SrSettings when used with multiple url's, authorization, custom headers, or
/// custom timeout.
pub struct SrSettingsBuilder {
    urls: Vec<String>,
    authorization: SrAuthorization,
    headers: DashMap<String, String>,
    proxy: Option<String>,
    no_proxy: bool,
    timeout: Duration,
}

/// Creates a new SrSettings struct that is needed to make calls to the schema registry
/// ```
/// use schema_registry_cache::async_impl::schema_registry::SrSettings;
/// let sr_settings = SrSettings::new(String::from("http://localhost:8081"));
/// ```
impl SrSettings {
    /// Will create a new SrSettings with default values, the url should be fully qualified like
    /// `"http://localhost:8081"`.
    pub fn new(url: String) -> SrSettings {
        SrSettings {
            urls: vec![url],
            client: Client::new(),
            authorization: SrAuthorization::None,
        }
    }

    /// Will create a new SrSettingsBuilder with default values, the url should be fully qualified
    /// like `"http://localhost:8081"`.
    pub fn new_builder(url: String) -> SrSettingsBuilder {
        SrSettingsBuilder {
            urls: vec![url],
            authorization: SrAuthorization::None,
            headers: DashMap::new(),
            proxy: None,
            no_proxy: false,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for SrSettings
/// ```
/// use schema_registry_cache::async_impl::schema_registry::SrSettings;
/// use std::time::Duration;
/// let sr_settings = SrSettings::new_builder(String::from("http://localhost:8081"))
///     .add_url(String::from("http://localhost:8082"))
///     .set_token_authorization("some_json_web_token_for_example")
///     .add_header("foo", "bar")
///     .set_proxy("http://localhost:8888")
///     .set_timeout(Duration::from_secs(5))
///     .build().unwrap();
/// ```
impl SrSettingsBuilder {
    /// Adds an url. For any call urls will be tried in order. the one used to create the settings
    /// struct first. All urls should be fully qualified.
    pub fn add_url(&mut self, url: String) -> &mut SrSettingsBuilder {
        self.urls.push(url);
        self
    }

    /// Sets the token that needs to be used to authenticate
    pub fn set_token_authorization(&mut self, token: &str) -> &mut SrSettingsBuilder {
        self.authorization = SrAuthorization::Token(String::from(token));
        self
    }

    /// Sets basic authentication, for confluent cloud, the username is the API Key and the password
    /// is the API Secret.
    pub fn set_basic_authorization(
        &mut self,
        username: &str,
        password: Option<&str>,
    ) -> &mut SrSettingsBuilder {
        self.authorization = SrAuthorization::Basic(String::from(username), password.map(String::from));
        self
    }

    /// Adds a custom header that will be added to every call.
    pub fn add_header(&mut self, key: &str, value: &str) -> &mut SrSettingsBuilder {
        self.headers.insert(String::from(key), String::from(value));
        self
    }

    /// Sets a proxy that will be used for every call.
    pub fn set_proxy(&mut self, proxy_url: &str) -> &mut SrSettingsBuilder {
        self.proxy = Some(String::from(proxy_url));
        self
    }

    /// prevents using any proxy to every call.
    pub fn no_proxy(&mut self) -> &mut SrSettingsBuilder {
        self.no_proxy = true;
        self
    }

    /// Set a timeout, it will be used for the connect and the read.
    pub fn set_timeout(&mut self, duration: Duration) -> &mut SrSettingsBuilder {
        self.timeout = duration;
        self
    }

    /// Build the settings with your own HTTP client.
    ///
    /// The other values (headers, proxy, etc.) will still be merged in, and they have higher
    /// precedence than the configuration of the supplied builder.
    pub fn build_with(&mut self, builder: ClientBuilder) -> Result<SrSettings, SRCError> {
        let client = self.build_client(builder)?;
        Ok(SrSettings {
            urls: self.urls.clone(),
            client,
            authorization: self.authorization.clone(),
        })
    }

    /// Build the settings.
    ///
    /// If you need your own client, see `build_with`.
    pub fn build(&mut self) -> Result<SrSettings, SRCError> {
        self.build_with(Client::builder())
    }

    fn build_client(&mut self, mut builder: ClientBuilder) -> Result<Client, SRCError> {
        if !self.headers.is_empty() {
            let mut header_map = header::HeaderMap::new();
            for ref_multi in self.headers.iter() {
                let header_name = HeaderName::from_bytes(ref_multi.key().as_bytes()).map_err(|e| {
                    SRCError::non_retryable_with_cause(
                        e,
                        &format!("could not create HeaderName from {}", ref_multi.key()),
                    )
                })?;
                let header_value = HeaderValue::from_str(ref_multi.value()).map_err(|e| {
                    SRCError::non_retryable_with_cause(
                        e,
                        &format!("could not create HeaderValue from {}", ref_multi.value()),
                    )
                })?;
                header_map.insert(header_name, header_value);
            }
            builder = builder.default_headers(header_map);
        }
        if let Some(proxy) = &self.proxy {
            match reqwest::Proxy::all(proxy) {
                Ok(v) => builder = builder.proxy(v),
                Err(e) => return Err(SRCError::non_retryable_with_cause(e, "invalid proxy value")),
            };
        }
        if self.no_proxy {
            builder = builder.no_proxy()
        }
        builder = builder.timeout(self.timeout);
        builder
            .build()
            .map_err(|e| SRCError::non_retryable_with_cause(e, "could not create new client"))
    }
}

#[async_trait]
impl SchemaRegistryClient for SrSettings {
    async fn list_subjects(&self) -> Result<Vec<String>, SRCError> {
        perform_sr_call(self, SrCall::GetSubjects).await
    }

    async fn list_versions(&self, subject: &str) -> Result<Vec<u32>, SRCError> {
        perform_sr_call(self, SrCall::GetVersions(subject)).await
    }

    async fn get_schema(&self, subject: &str, version: u32) -> Result<RegisteredSchema, SRCError> {
        let raw_schema: RawRegisteredSchema =
            perform_sr_call(self, SrCall::GetBySubjectAndVersion(subject, version)).await?;
        raw_schema.into_registered_schema(None)
    }

    async fn get_latest_schema(&self, subject: &str) -> Result<RegisteredSchema, SRCError> {
        let raw_schema: RawRegisteredSchema =
            perform_sr_call(self, SrCall::GetLatest(subject)).await?;
        raw_schema.into_registered_schema(None)
    }

    async fn get_schema_by_id(&self, id: u32) -> Result<RegisteredSchema, SRCError> {
        let raw_schema: RawRegisteredSchema = perform_sr_call(self, SrCall::GetById(id)).await?;
        raw_schema.into_registered_schema(Some(id))
    }

    async fn get_subject_versions_for_id(
        &self,
        id: u32,
    ) -> Result<Vec<SubjectVersion>, SRCError> {
        perform_sr_call(self, SrCall::GetSubjectVersionsById(id)).await
    }
}

/// Does the call, trying the urls in order until one of them gives a successful result.
pub async fn perform_sr_call<R: DeserializeOwned>(
    sr_settings: &SrSettings,
    sr_call: SrCall<'_>,
) -> Result<R, SRCError> {
    let url_count = sr_settings.urls.len();
    let mut n = 0;
    loop {
        let result = perform_single_sr_call(
            &sr_settings.urls[n],
            &sr_settings.client,
            &sr_settings.authorization,
            sr_call,
        )
        .await;
        if result.is_ok() || n + 1 == url_count {
            break result;
        }
        n += 1
    }
}

async fn send_with_auth(
    builder: RequestBuilder,
    authentication: &SrAuthorization,
) -> Result<Response, SRCError> {
    let res = match authentication {
        SrAuthorization::None => builder.send().await,
        SrAuthorization::Token(token) => builder.bearer_auth(token).send().await,
        SrAuthorization::Basic(username, password) => {
            builder.basic_auth(username, password.as_ref()).send().await
        }
    }
    .map_err(|e| SRCError::retryable_with_cause(e, "http call to schema registry failed"))?;
    let st = res.status();
    if st.is_success() {
        return Ok(res);
    }
    let raw_error = res.json::<RawError>().await.unwrap_or_else(|_| RawError {
        error_code: 0,
        message: "couldn't parse schema registry error json".to_owned(),
    });
    let error = format!("HTTP request to schema registry failed with status {}", st);
    // Handle non successful HTTP Requests
    Err(match st.as_u16() {
        502 | 503 => SRCError::retryable_with_cause(raw_error, &error),
        _ => SRCError::non_retryable_with_cause(raw_error, &error),
    })
}

async fn perform_single_sr_call<R: DeserializeOwned>(
    base_url: &str,
    client: &Client,
    authentication: &SrAuthorization,
    sr_call: SrCall<'_>,
) -> Result<R, SRCError> {
    let url = url_for_call(&sr_call, base_url);
    let builder = client
        .get(&url)
        .header(ACCEPT, "application/vnd.schemaregistry.v1+json");
    let successful_response = send_with_auth(builder, authentication).await?;
    successful_response.json::<R>().await.map_err(|e| {
        SRCError::new(
            ErrorKind::Response,
            &format!("could not parse response for {:?}", sr_call),
            Some(format!("{}", e)),
            false,
        )
    })
}
