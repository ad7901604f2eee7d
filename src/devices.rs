//! The two MELCloud read endpoints.
//!
//! - [`list_devices`] — every device visible to the account, grouped by
//!   building.
//! - [`get_device`] — the current state of one device.
//!
//! Both return the raw [`ResponseBody`]; the JSON schema belongs to the
//! caller. The URL builders are pure and exposed for callers that want to
//! inspect or log the request target.

use tracing::debug;
use url::Url;

use crate::client::{MelCloudClient, ResponseBody};
use crate::config::Endpoints;
use crate::error::{Operation, Result};

/// Device list URL. Takes no query parameters.
pub fn device_list_url(endpoints: &Endpoints) -> Url {
    endpoints.device_list.clone()
}

/// Device info URL with `id` and `buildingID` set, percent-encoded.
/// Existing values for those keys are replaced.
pub fn device_info_url(endpoints: &Endpoints, device_id: &str, building_id: &str) -> Url {
    let mut url = endpoints.device_info.clone();
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "id" && k != "buildingID")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("id", device_id)
        .append_pair("buildingID", building_id);
    url
}

/// `GET` the device list.
pub async fn list_devices(client: &MelCloudClient) -> Result<ResponseBody> {
    let url = device_list_url(client.endpoints());
    debug!(url = %url, "requesting device list from MELCloud");
    client.get_authenticated(Operation::DeviceList, url).await
}

/// `GET` one device's info.
pub async fn get_device(
    client: &MelCloudClient,
    device_id: &str,
    building_id: &str,
) -> Result<ResponseBody> {
    let url = device_info_url(client.endpoints(), device_id, building_id);
    debug!(
        url = %url,
        device_id,
        building_id,
        "requesting device info from MELCloud"
    );
    client.get_authenticated(Operation::DeviceInfo, url).await
}
