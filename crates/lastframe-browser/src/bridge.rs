//! Document and media bridges over WebDriver.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use lastframe_media::{
    decode_image, AddedNode, AdditionReceiver, BridgeError, BridgeResult, DocumentBridge,
    MediaBridge, PixelBuffer, ReadyState,
};
use lastframe_models::{ContainerLocator, NodeHandle, VideoResourceDescriptor};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::{element_arg, element_id, WebDriverClient};
use crate::config::WebDriverConfig;
use crate::error::BrowserResult;
use crate::scripts;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Bridges backed by scripts executed in the monitored page.
#[derive(Clone)]
pub struct WebDriverBridge {
    client: WebDriverClient,
    poll_interval: Duration,
}

impl WebDriverBridge {
    pub fn new(client: WebDriverClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Attach to the configured session.
    pub async fn attach(config: &WebDriverConfig) -> BrowserResult<Self> {
        let client = WebDriverClient::attach(config).await?;
        Ok(Self::new(client, config.watch_poll_interval))
    }

    async fn on_node(&self, script: &str, node: &NodeHandle, extra: Vec<Value>) -> BridgeResult<Value> {
        let mut args = vec![element_arg(node.as_str())];
        args.extend(extra);
        self.client
            .execute(script, args)
            .await
            .map_err(|e| e.into_bridge(Some(node)))
    }

    async fn on_node_async(
        &self,
        script: &str,
        node: &NodeHandle,
        extra: Vec<Value>,
    ) -> BridgeResult<Value> {
        let mut args = vec![element_arg(node.as_str())];
        args.extend(extra);
        self.client
            .execute_async(script, args)
            .await
            .map_err(|e| e.into_bridge(Some(node)))
    }

    /// Drain buffered additions into `tx` until the receiver goes away or the
    /// session is lost.
    async fn pump_additions(self, tx: mpsc::UnboundedSender<Vec<AddedNode>>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = interval.tick() => {}
            }

            match self.client.execute(scripts::DRAIN_ADDITIONS, vec![]).await {
                Ok(value) => {
                    let batch = parse_additions(&value);
                    if !batch.is_empty() && tx.send(batch).is_err() {
                        break;
                    }
                }
                Err(e) if e.is_session_lost() => {
                    warn!("WebDriver session lost, stopping mutation watch: {}", e);
                    break;
                }
                Err(e) => warn!("Failed to drain mutation buffer: {}", e),
            }
        }

        if let Err(e) = self.client.execute(scripts::DISCONNECT_OBSERVER, vec![]).await {
            debug!("Failed to disconnect observer: {}", e);
        }
        debug!("Mutation watch stopped");
    }
}

fn parse_additions(value: &Value) -> Vec<AddedNode> {
    value
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let id = element_id(entry.get(0)?)?;
                    Some(AddedNode {
                        node: NodeHandle::from_string(id),
                        is_video: entry.get(1).and_then(Value::as_bool).unwrap_or(false),
                        raw_source: entry.get(2).and_then(Value::as_str).map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn millis(limit: Duration) -> u64 {
    limit.as_millis().min(u64::MAX as u128) as u64
}

/// Result of a bounded async wait: `true` settled, `false` the page timer won.
fn settled(value: &Value) -> BridgeResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| BridgeError::protocol(format!("expected a boolean, got {}", value)))
}

fn parse_dimension(value: Option<&Value>) -> BridgeResult<u32> {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
        .ok_or_else(|| BridgeError::protocol(format!("invalid dimension: {:?}", value)))
}

fn decode_data_url(data_url: &str) -> BridgeResult<PixelBuffer> {
    let encoded = data_url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .ok_or_else(|| BridgeError::script("canvas did not produce a PNG data URL"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| BridgeError::protocol(format!("invalid base64 in data URL: {}", e)))?;
    decode_image(&bytes).map_err(|e| BridgeError::protocol(e.to_string()))
}

#[async_trait]
impl DocumentBridge for WebDriverBridge {
    async fn resolve_container(
        &self,
        locator: &ContainerLocator,
    ) -> BridgeResult<Option<NodeHandle>> {
        let value = self
            .client
            .execute(scripts::RESOLVE_XPATH, vec![json!(locator.as_str())])
            .await
            .map_err(|e| e.into_bridge(None))?;

        if value.is_null() {
            return Ok(None);
        }
        element_id(&value)
            .map(|id| Some(NodeHandle::from_string(id)))
            .ok_or_else(|| BridgeError::protocol("XPath did not resolve to an element"))
    }

    async fn video_descendants(
        &self,
        root: &NodeHandle,
    ) -> BridgeResult<Vec<VideoResourceDescriptor>> {
        let value = self.on_node(scripts::VIDEO_DESCENDANTS, root, vec![]).await?;
        let entries = value
            .as_array()
            .ok_or_else(|| BridgeError::protocol("expected an array of videos"))?;

        Ok(entries
            .iter()
            .filter_map(|entry| {
                let id = element_id(entry.get(0)?)?;
                let src = entry.get(1).and_then(Value::as_str).map(str::to_string);
                Some(VideoResourceDescriptor::new(NodeHandle::from_string(id), src))
            })
            .collect())
    }

    async fn observe_additions(&self, container: &NodeHandle) -> BridgeResult<AdditionReceiver> {
        self.on_node(scripts::INSTALL_OBSERVER, container, vec![])
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.clone().pump_additions(tx));
        Ok(rx)
    }
}

#[async_trait]
impl MediaBridge for WebDriverBridge {
    async fn pause(&self, node: &NodeHandle) -> BridgeResult<()> {
        self.on_node(scripts::PAUSE, node, vec![]).await?;
        Ok(())
    }

    async fn ready_state(&self, node: &NodeHandle) -> BridgeResult<ReadyState> {
        let value = self.on_node(scripts::READY_STATE, node, vec![]).await?;
        value
            .as_u64()
            .map(ReadyState::from_raw)
            .ok_or_else(|| BridgeError::protocol(format!("invalid readyState: {}", value)))
    }

    async fn wait_until_ready(&self, node: &NodeHandle, limit: Duration) -> BridgeResult<bool> {
        let value = self
            .on_node_async(scripts::WAIT_UNTIL_READY, node, vec![json!(millis(limit))])
            .await?;
        settled(&value)
    }

    async fn duration(&self, node: &NodeHandle) -> BridgeResult<Option<f64>> {
        let value = self.on_node(scripts::DURATION, node, vec![]).await?;
        Ok(value.as_f64())
    }

    async fn seek_and_settle(
        &self,
        node: &NodeHandle,
        position: f64,
        limit: Duration,
    ) -> BridgeResult<bool> {
        let value = self
            .on_node_async(
                scripts::SEEK_AND_SETTLE,
                node,
                vec![json!(position), json!(millis(limit))],
            )
            .await?;
        settled(&value)
    }

    async fn natural_size(&self, node: &NodeHandle) -> BridgeResult<(u32, u32)> {
        let value = self.on_node(scripts::NATURAL_SIZE, node, vec![]).await?;
        Ok((parse_dimension(value.get(0))?, parse_dimension(value.get(1))?))
    }

    async fn snapshot(
        &self,
        node: &NodeHandle,
        width: u32,
        height: u32,
    ) -> BridgeResult<PixelBuffer> {
        let value = self
            .on_node(scripts::SNAPSHOT, node, vec![json!(width), json!(height)])
            .await?;
        let data_url = value
            .as_str()
            .ok_or_else(|| BridgeError::protocol("snapshot did not return a string"))?;

        let pixels = decode_data_url(data_url)?;
        if (pixels.width, pixels.height) != (width, height) {
            return Err(BridgeError::protocol(format!(
                "snapshot is {}x{}, expected {}x{}",
                pixels.width, pixels.height, width, height
            )));
        }
        Ok(pixels)
    }
}
