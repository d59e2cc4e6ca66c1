//! Service plan parameters and disk space validation

use crate::client::{AivenApi, ServiceTypes};
use crate::units::{MIB, human_readable_byte_size};

/// Disk limits of a plan in a cloud region, all in MiB
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServicePlanParameters {
    pub disk_size_mb_default: i64,
    pub disk_size_mb_step: i64,
    pub disk_size_mb_max: i64,
}

impl ServicePlanParameters {
    /// Disk size can only be changed when both a cap and a step are known
    pub fn disk_size_is_configurable(&self) -> bool {
        self.disk_size_mb_max != 0 && self.disk_size_mb_step != 0
    }

    pub fn disk_size_matches_default(&self, requested_mb: i64) -> bool {
        self.disk_size_mb_default == requested_mb
    }
}

/// Look up the parameters of `plan` in `cloud` for `service_type`
///
/// The first plan with a matching name that is offered in the cloud wins.
pub fn find_plan_parameters(
    types: &ServiceTypes,
    service_type: &str,
    plan: &str,
    cloud: &str,
) -> Result<ServicePlanParameters, String> {
    let description = types
        .service_types
        .get(service_type)
        .ok_or_else(|| format!("service type '{}' unknown to service types api", service_type))?;

    description
        .service_plans
        .iter()
        .filter(|p| p.service_plan == plan)
        .find_map(|p| p.regions.get(cloud))
        .map(|region| ServicePlanParameters {
            disk_size_mb_default: region.disk_space_mb,
            disk_size_mb_step: region.disk_space_step_mb,
            disk_size_mb_max: region.disk_space_cap_mb,
        })
        .ok_or_else(|| {
            format!(
                "unable to find service plan parameters for '{}', '{}', '{}'",
                service_type, plan, cloud
            )
        })
}

/// Fetch service types for the project and resolve plan parameters
pub async fn get_plan_parameters(
    api: &dyn AivenApi,
    project: &str,
    service_type: &str,
    plan: &str,
    cloud: &str,
) -> Result<ServicePlanParameters, String> {
    let types = api
        .get_service_types(project)
        .await
        .map_err(|e| format!("unable to get service types from api: {}", e))?;
    find_plan_parameters(&types, service_type, plan, cloud)
}

/// Check a requested disk size against the plan limits
pub fn check_disk_size(params: &ServicePlanParameters, requested_mb: i64) -> Result<(), String> {
    if !params.disk_size_matches_default(requested_mb) && !params.disk_size_is_configurable() {
        return Err("service plan parameters are not configurable for this service".to_string());
    }

    let human = |mb: i64| human_readable_byte_size(mb * MIB);

    if requested_mb < params.disk_size_mb_default {
        return Err(format!(
            "requested disk size is too small: '{}' < '{}'",
            human(requested_mb),
            human(params.disk_size_mb_default)
        ));
    }
    if params.disk_size_mb_max != 0 && requested_mb > params.disk_size_mb_max {
        return Err(format!(
            "requested disk size is too large: '{}' > '{}'",
            human(requested_mb),
            human(params.disk_size_mb_max)
        ));
    }
    if params.disk_size_mb_step != 0
        && (requested_mb - params.disk_size_mb_default) % params.disk_size_mb_step != 0
    {
        return Err(format!(
            "requested disk size has to increase from: '{}' in increments of '{}'",
            human(params.disk_size_mb_default),
            human(params.disk_size_mb_step)
        ));
    }
    Ok(())
}
