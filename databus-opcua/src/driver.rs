//! OPC-UA transport driver.
//!
//! The `opcua` client is synchronous, so every session call runs on the
//! blocking pool and is bounded by the configured timeouts. The session's
//! own background loop (keep-alive and publish requests for subscriptions)
//! is started once the session is connected.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use opcua::client::prelude::*;
use opcua::sync::RwLock as SessionLock;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use databus_common::{
    ContextDescriptor, Direction, Endpoint, Error, Format, OpcUaSecurity, Payload, Result,
    TopicDescriptor, TransportOptions,
};
use databus_common::topic::is_wildcard;
use databus_core::{
    Connection, MessageHandler, TopicRouter, TransportDriver, check_direction, check_payload,
};

use crate::node::{self, NamespaceRef};
use crate::variant;

type SharedSession = Arc<SessionLock<Session>>;

/// Driver for `opcua://host:port/<namespace>/` endpoints.
#[derive(Debug, Clone, Default)]
pub struct OpcUaDriver {
    options: TransportOptions,
}

impl OpcUaDriver {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl TransportDriver for OpcUaDriver {
    fn name(&self) -> &'static str {
        "opcua"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["opcua"]
    }

    async fn create_context(
        &self,
        descriptor: &ContextDescriptor,
        endpoint: &Endpoint,
    ) -> Result<Box<dyn Connection>> {
        let namespace = NamespaceRef::from_endpoint(endpoint)?;
        let url = node::server_url(endpoint);
        let timeout = self.options.connect_timeout();

        debug!(context = %descriptor.name, url = %url, "Connecting to OPC-UA server");

        let options = self.options.clone();
        let connect = tokio::task::spawn_blocking(move || {
            let session = open_session(&url, &options)?;
            let ns = resolve_namespace(&session, &namespace)?;
            Ok::<_, String>((session, ns))
        });

        let (session, ns) = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(Ok(connected))) => connected,
            Ok(Ok(Err(reason))) => return Err(Error::connect(endpoint.to_string(), reason)),
            Ok(Err(e)) => return Err(Error::connect(endpoint.to_string(), e)),
            Err(_) => {
                return Err(Error::connect(
                    endpoint.to_string(),
                    format!("no session within {:?}", timeout),
                ));
            }
        };

        let session_loop = Session::run_async(session.clone());

        info!(
            context = %descriptor.name,
            endpoint = %endpoint,
            namespace = ns,
            "Connected to OPC-UA server"
        );

        Ok(Box::new(OpcUaConnection {
            direction: descriptor.direction,
            session,
            ns,
            op_timeout: self.options.send_timeout(),
            publishing_interval: Duration::from_millis(self.options.opcua.publishing_interval_ms),
            // Values arrive as text, so `json` topics are always JSON here.
            router: Arc::new(TopicRouter::new(self.options.channel_capacity, Format::Json)),
            subscriptions: Mutex::new(HashMap::new()),
            requests: tokio::sync::Mutex::new(()),
            session_loop: Mutex::new(Some(session_loop)),
            destroyed: AtomicBool::new(false),
        }))
    }
}

fn security(level: OpcUaSecurity) -> (SecurityPolicy, MessageSecurityMode) {
    match level {
        OpcUaSecurity::None => (SecurityPolicy::None, MessageSecurityMode::None),
        OpcUaSecurity::Sign => (SecurityPolicy::Basic256Sha256, MessageSecurityMode::Sign),
        OpcUaSecurity::SignAndEncrypt => (
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        ),
    }
}

fn open_session(url: &str, options: &TransportOptions) -> std::result::Result<SharedSession, String> {
    let opcua = &options.opcua;
    let mut builder = ClientBuilder::new()
        .application_name(opcua.application_name.as_str())
        .application_uri(opcua.application_uri.as_str())
        .trust_server_certs(opcua.trust_server_certs)
        .create_sample_keypair(opcua.security != OpcUaSecurity::None)
        .session_retry_limit(0);

    if let Some(pki_dir) = &opcua.pki_dir {
        builder = builder.pki_dir(pki_dir.clone());
    }

    let mut client = builder
        .client()
        .ok_or_else(|| "invalid OPC-UA client configuration".to_string())?;

    let identity = match &options.credentials {
        Some(credentials) => {
            IdentityToken::UserName(credentials.username.clone(), credentials.password.clone())
        }
        None => IdentityToken::Anonymous,
    };

    let (policy, mode) = security(opcua.security);
    client
        .connect_to_endpoint(
            (url, policy.to_str(), mode, UserTokenPolicy::anonymous()),
            identity,
        )
        .map_err(|status| format!("session refused: {}", status))
}

fn resolve_namespace(
    session: &SharedSession,
    namespace: &NamespaceRef,
) -> std::result::Result<u16, String> {
    let request = ReadValueId {
        node_id: VariableId::Server_NamespaceArray.into(),
        attribute_id: AttributeId::Value as u32,
        index_range: UAString::null(),
        data_encoding: QualifiedName::null(),
    };

    let values = session
        .read()
        .read(&[request], TimestampsToReturn::Neither, 0.0)
        .map_err(|status| format!("cannot read namespace array: {}", status))?;

    let namespaces: Vec<String> = match values.first().and_then(|dv| dv.value.as_ref()) {
        Some(Variant::Array(array)) => array
            .values
            .iter()
            .filter_map(|v| match v {
                Variant::String(s) => Some(s.as_ref().to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    namespace.resolve(&namespaces)
}

struct OpcUaConnection {
    direction: Direction,
    session: SharedSession,
    ns: u16,
    op_timeout: Duration,
    publishing_interval: Duration,
    router: Arc<TopicRouter>,
    /// Topic name to server subscription id.
    subscriptions: Mutex<HashMap<String, u32>>,
    requests: tokio::sync::Mutex<()>,
    session_loop: Mutex<Option<oneshot::Sender<SessionCommand>>>,
    destroyed: AtomicBool,
}

impl OpcUaConnection {
    fn ensure_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(Error::ContextDestroyed)
        } else {
            Ok(())
        }
    }

    /// Run a session call on the blocking pool, bounded by the operation timeout.
    async fn call<T, F>(&self, op: F) -> std::result::Result<T, String>
    where
        F: FnOnce(&Session) -> std::result::Result<T, String> + Send + 'static,
        T: Send + 'static,
    {
        let session = self.session.clone();
        let task = tokio::task::spawn_blocking(move || {
            let session = session.read();
            op(&session)
        });

        match tokio::time::timeout(self.op_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("no response within {:?}", self.op_timeout)),
        }
    }

    async fn subscribe_node(&self, topic: &TopicDescriptor) -> Result<()> {
        if is_wildcard(&topic.name) {
            return Err(Error::bind(
                &topic.name,
                "wildcard filters cannot address OPC-UA nodes",
            ));
        }
        if self.subscriptions.lock().contains_key(&topic.name) {
            return Ok(());
        }

        let node = node::node_id(self.ns, &topic.name);
        let name = topic.name.clone();
        let router = self.router.clone();
        let interval = self.publishing_interval.as_millis() as f64;

        let subscription_id = self
            .call(move |session| {
                let callback_topic = name.clone();
                let subscription_id = session
                    .create_subscription(
                        interval,
                        10,
                        30,
                        0,
                        0,
                        true,
                        DataChangeCallback::new(move |items| {
                            for item in items.iter() {
                                let Some(value) = item.last_value().value.as_ref() else {
                                    continue;
                                };
                                match variant::to_bytes(value) {
                                    Some(data) => {
                                        router.dispatch(&callback_topic, &data);
                                    }
                                    None => {
                                        trace!(topic = %callback_topic, "Skipping value without text form");
                                    }
                                }
                            }
                        }),
                    )
                    .map_err(|status| format!("create subscription: {}", status))?;

                let request = MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId {
                        node_id: node,
                        attribute_id: AttributeId::Value as u32,
                        index_range: UAString::null(),
                        data_encoding: QualifiedName::null(),
                    },
                    monitoring_mode: MonitoringMode::Reporting,
                    requested_parameters: MonitoringParameters {
                        sampling_interval: interval,
                        filter: ExtensionObject::null(),
                        queue_size: 10,
                        discard_oldest: true,
                        client_handle: 0,
                    },
                };

                let created = session
                    .create_monitored_items(subscription_id, TimestampsToReturn::Both, &[request])
                    .map_err(|status| format!("create monitored item: {}", status));

                let failure = match &created {
                    Ok(results) => match results.first() {
                        Some(result) if result.status_code.is_good() => None,
                        Some(result) => Some(format!("monitored item rejected: {}", result.status_code)),
                        None => Some("monitored item rejected".to_string()),
                    },
                    Err(reason) => Some(reason.clone()),
                };

                match failure {
                    None => Ok(subscription_id),
                    Some(reason) => {
                        let _ = session.delete_subscription(subscription_id);
                        Err(reason)
                    }
                }
            })
            .await
            .map_err(|reason| Error::bind(&topic.name, reason))?;

        self.subscriptions
            .lock()
            .insert(topic.name.clone(), subscription_id);
        debug!(topic = %topic.name, subscription_id, "OPC-UA subscription created");
        Ok(())
    }

    /// Publishers bind a topic only if its node exists and is readable.
    async fn check_node(&self, topic: &TopicDescriptor) -> Result<()> {
        let node = node::node_id(self.ns, &topic.name);
        self.call(move |session| {
            let request = ReadValueId {
                node_id: node,
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            };
            let values = session
                .read(&[request], TimestampsToReturn::Neither, 0.0)
                .map_err(|status| format!("read failed: {}", status))?;
            match values.first().and_then(|dv| dv.status) {
                Some(status) if status.is_bad() => Err(format!("node not readable: {}", status)),
                _ if values.is_empty() => Err("node not readable".to_string()),
                _ => Ok(()),
            }
        })
        .await
        .map_err(|reason| Error::bind(&topic.name, reason))
    }
}

#[async_trait]
impl Connection for OpcUaConnection {
    async fn start_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;
        let _guard = self.requests.lock().await;
        match self.direction {
            Direction::Publisher => self.check_node(topic).await,
            Direction::Subscriber => self.subscribe_node(topic).await,
        }
    }

    async fn send(&self, topic: &TopicDescriptor, payload: &Payload) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Publisher, "send")?;
        check_payload("opcua", variant::ACCEPTED, payload)?;

        let value = variant::to_variant(payload)?;
        let node = node::node_id(self.ns, &topic.name);

        let _guard = self.requests.lock().await;
        self.call(move |session| {
            let write = WriteValue {
                node_id: node,
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                value: DataValue::new_now(value),
            };
            let results = session
                .write(&[write])
                .map_err(|status| format!("write failed: {}", status))?;
            match results.first() {
                Some(status) if status.is_good() => Ok(()),
                Some(status) => Err(format!("write rejected: {}", status)),
                None => Err("write rejected".to_string()),
            }
        })
        .await
        .map_err(|reason| Error::send(&topic.name, reason))?;

        trace!(topic = %topic.name, "OPC-UA write");
        Ok(())
    }

    async fn receive(&self, topic: &TopicDescriptor, handler: MessageHandler) -> Result<()> {
        self.ensure_live()?;
        check_direction(self.direction, Direction::Subscriber, "receive")?;
        self.router.register(topic, handler);
        Ok(())
    }

    async fn stop_topic(&self, topic: &TopicDescriptor) -> Result<()> {
        self.ensure_live()?;

        let subscription_id = self.subscriptions.lock().get(&topic.name).copied();
        if let Some(subscription_id) = subscription_id {
            let _guard = self.requests.lock().await;
            self.call(move |session| {
                session
                    .delete_subscription(subscription_id)
                    .map(|_| ())
                    .map_err(|status| format!("delete subscription: {}", status))
            })
            .await
            .map_err(|reason| Error::unbind(&topic.name, reason))?;

            self.subscriptions.lock().remove(&topic.name);
        }

        self.router.unregister(&topic.name);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.router.clear();
        self.subscriptions.lock().clear();

        if let Some(stop) = self.session_loop.lock().take() {
            let _ = stop.send(SessionCommand::Stop);
        }

        if let Err(reason) = self
            .call(|session| {
                session.disconnect();
                Ok(())
            })
            .await
        {
            warn!(error = %reason, "OPC-UA disconnect did not complete");
        }

        info!("OPC-UA session closed");
        Ok(())
    }
}
