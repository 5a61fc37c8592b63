//! Per-session bootstrap
//!
//! Runs once for every successful connection: fetch and persist metadata,
//! subscribe to the state feeds, acquire the pointer socket. The three steps
//! run concurrently and each may fail on its own. The task then stays alive
//! running the feed consumers until the session ends or the supervisor aborts
//! it.

use crate::context::{lock, DeviceContext};
use crate::error::{WebOsError, Result};
use crate::pointer::ButtonSink;
use crate::protocol::uri;
use crate::state::Feed;
use crate::storage::StoredFile;
use crate::subscription::Subscription;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinSet;

pub(crate) async fn run_session(ctx: Arc<DeviceContext>, generation: u64) {
    let (_, mut feeds, socket) = tokio::join!(
        fetch_metadata(&ctx),
        subscribe_feeds(&ctx),
        acquire_pointer(&ctx)
    );

    if let Some(socket) = socket {
        if ctx.pointer.install(generation, socket) {
            tracing::info!("Device {} pointer input socket ready", ctx.host);
        } else {
            tracing::debug!("Device {} dropping pointer socket of an ended session", ctx.host);
        }
    }
    tracing::debug!("Device {} session ready", ctx.host);

    while let Some(joined) = feeds.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::error!("Device {} feed consumer panicked: {}", ctx.host, e);
            }
        }
    }
    tracing::debug!("Device {} feeds ended", ctx.host);
}

async fn fetch_metadata(ctx: &DeviceContext) {
    let (system, software, services, apps) = tokio::join!(
        ctx.transport.request(uri::SYSTEM_INFO, None),
        ctx.transport.request(uri::SOFTWARE_INFO, None),
        ctx.transport.request(uri::SERVICE_LIST, None),
        ctx.transport.request(uri::LIST_APPS, None),
    );

    if let Some(info) = keep(ctx, StoredFile::SystemInfo, system) {
        lock(&ctx.profile).refine_from_system_info(&info);
    }
    if let Some(info) = keep(ctx, StoredFile::SoftwareInfo, software) {
        lock(&ctx.profile).refine_from_software_info(&info);
    }
    keep(ctx, StoredFile::Services, services);
    keep(ctx, StoredFile::Apps, apps);

    let profile = lock(&ctx.profile).clone();
    if ctx.announced.swap(true, Ordering::Relaxed) {
        tracing::debug!(
            "Device {} is {} {} firmware {}",
            ctx.host, profile.manufacturer, profile.model_name, profile.firmware_revision
        );
        return;
    }
    tracing::info!("-------- {} --------", profile.name);
    tracing::info!("Manufacturer: {}", profile.manufacturer);
    tracing::info!("Model: {}", profile.model_name);
    tracing::info!(
        "System: {}",
        profile.product_name.as_deref().unwrap_or("unknown")
    );
    tracing::info!("Serialnr: {}", profile.serial_number);
    tracing::info!("Firmware: {}", profile.firmware_revision);
}

/// Persist a metadata reply the first time it is seen, then hand it back
fn keep(ctx: &DeviceContext, file: StoredFile, reply: Result<Value>) -> Option<Value> {
    let mut value = match reply {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Device {} could not fetch {:?}: {}", ctx.host, file, e);
            return None;
        }
    };
    if let Some(object) = value.as_object_mut() {
        object.remove("returnValue");
    }

    match ctx.storage.write_once(file, &value) {
        Ok(true) => tracing::debug!("Device {} saved {:?}", ctx.host, file),
        Ok(false) => {}
        Err(e) => tracing::warn!("Device {} could not save {:?}: {}", ctx.host, file, e),
    }
    Some(value)
}

async fn subscribe_feeds(ctx: &Arc<DeviceContext>) -> JoinSet<()> {
    let mut feeds = JoinSet::new();
    for feed in Feed::ALL {
        match ctx.transport.subscribe(feed.uri(), None).await {
            Ok(subscription) => {
                feeds.spawn(follow(ctx.clone(), feed, subscription));
            }
            Err(e) => tracing::warn!("Device {} could not subscribe to {}: {}", ctx.host, feed.uri(), e),
        }
    }
    feeds
}

/// Apply every push of one feed to the snapshot until the session ends
async fn follow(ctx: Arc<DeviceContext>, feed: Feed, mut subscription: Subscription) {
    loop {
        match subscription.recv().await {
            Ok(payload) => match ctx.update(|snapshot| feed.apply(snapshot, &payload)) {
                Ok(()) => tracing::debug!("Device {} {:?} update: {}", ctx.host, feed, payload),
                Err(e) => tracing::debug!("Device {} ignoring {:?} push: {}", ctx.host, feed, e),
            },
            Err(WebOsError::ConnectionClosed) => break,
            Err(e) => tracing::warn!("Device {} {:?} push error: {}", ctx.host, feed, e),
        }
    }
}

async fn acquire_pointer(ctx: &DeviceContext) -> Option<Arc<dyn ButtonSink>> {
    match ctx.transport.get_socket(uri::POINTER_SOCKET).await {
        Ok(socket) => Some(socket),
        Err(e) => {
            tracing::warn!("Device {} could not get pointer input socket: {}", ctx.host, e);
            None
        }
    }
}
