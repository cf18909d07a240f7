use crate::k8s::conversion;
use kube::core::{
    conversion::{ConversionRequest, ConversionResponse, ConversionReview},
    Status,
};
use tracing::{debug, info, warn};

/// Converts every object in a review to the requested Tenant version.
///
/// The request fails as a whole if any object cannot be converted.
pub(crate) fn review(review: ConversionReview) -> Option<ConversionReview> {
    let mut req = match ConversionRequest::from_review(review) {
        Ok(req) => req,
        Err(error) => {
            warn!(%error, "Invalid conversion review");
            return None;
        }
    };
    let desired = req.desired_api_version.clone();
    let objects = std::mem::take(&mut req.objects);
    debug!(uid = %req.uid, %desired, objects = objects.len(), "Converting");

    let rsp = ConversionResponse::for_request(req);
    let converted = objects
        .into_iter()
        .map(|obj| conversion::convert(obj, &desired))
        .collect::<Result<Vec<_>, _>>();
    let rsp = match converted {
        Ok(objects) => rsp.success(objects),
        Err(error) => {
            info!(%error, %desired, "Failed to convert tenants");
            rsp.failure(Status::failure(&error.to_string(), "ConversionFailed"))
        }
    };
    Some(rsp.into_review())
}
