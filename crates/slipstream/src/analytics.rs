use posthog_rs::Event;

fn capture_async(event: Event) {
    tokio::spawn(async move {
        if let Err(e) = posthog_rs::capture(event).await {
            tracing::error!("Failed to capture posthog event: {}", e);
        }
    });
}

pub fn track_manifest_request(platform: &str, version: &str, digest_present: bool) {
    let mut event = Event::new_anon("manifest_request");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("version", version).ok();
    event.insert_prop("digest_present", digest_present).ok();
    capture_async(event);
}

pub fn track_manifest_failed(platform: &str, error_kind: &str) {
    let mut event = Event::new_anon("manifest_request_failed");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}

pub fn track_download_redirect(platform: &str, asset: &str) {
    let mut event = Event::new_anon("download_redirect");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("asset", asset).ok();
    capture_async(event);
}

pub fn track_download_stream(asset: &str, upstream_status: u16) {
    let mut event = Event::new_anon("download_stream");
    event.insert_prop("asset", asset).ok();
    event.insert_prop("upstream_status", upstream_status).ok();
    capture_async(event);
}

pub fn track_download_failed(platform: &str, error_kind: &str) {
    let mut event = Event::new_anon("download_failed");
    event.insert_prop("platform", platform).ok();
    event.insert_prop("error_kind", error_kind).ok();
    capture_async(event);
}
