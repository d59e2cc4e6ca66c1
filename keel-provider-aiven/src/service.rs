//! Service resource family operations

use std::collections::HashMap;

use keel_core::provider::{ProviderError, ProviderResult, Timeouts};
use keel_core::resource::{Resource, ResourceId, State, Value};

use crate::client::{
    ConnectionInfo, CreateServiceRequest, MaintenanceWindow, NewServiceIntegration, Service,
    ServiceComponent, UpdateServiceRequest,
};
use crate::plan_params::{ServicePlanParameters, check_disk_size, get_plan_parameters};
use crate::provider::{AivenProvider, api_error};
use crate::schemas::GENERIC_SERVICE;
use crate::units::{MIB, human_readable_byte_size, parse_disk_space_mb};
use crate::utils::{build_resource_id, merge_declared, split_resource_id, user_config_from_json, user_config_to_json};
use crate::waiter::{Operation, ServiceChangeWaiter};

/// Service type of a declared resource; the generic resource names it explicitly
fn declared_service_type(resource: &Resource) -> &str {
    if resource.id.resource_type == GENERIC_SERVICE {
        resource.get_str("service_type")
    } else {
        &resource.id.resource_type
    }
}

fn user_config_key(service_type: &str) -> String {
    format!("{}_user_config", service_type)
}

fn split_service_id(identifier: &str) -> ProviderResult<(&str, &str)> {
    let parts = split_resource_id(identifier, 2).map_err(ProviderError::new)?;
    Ok((parts[0], parts[1]))
}

fn project_vpc_id(resource: &Resource) -> ProviderResult<Option<String>> {
    let vpc = resource.get_str("project_vpc_id");
    if vpc.is_empty() {
        return Ok(None);
    }
    let parts = split_resource_id(vpc, 2).map_err(ProviderError::new)?;
    Ok(Some(parts[1].to_string()))
}

/// Both day and time must be declared for a window to be requested
fn maintenance_window(resource: &Resource) -> Option<MaintenanceWindow> {
    let dow = resource.get_str("maintenance_window_dow");
    let time = resource.get_str("maintenance_window_time");
    if dow.is_empty() || time.is_empty() {
        return None;
    }
    Some(MaintenanceWindow {
        day_of_week: dow.to_string(),
        time_of_day: time.to_string(),
    })
}

fn service_integrations(resource: &Resource) -> Vec<NewServiceIntegration> {
    resource
        .attributes
        .get("service_integrations")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_map)
        .map(|m| NewServiceIntegration {
            integration_type: m
                .get("integration_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            source_service: m
                .get("source_service_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            user_config: serde_json::Map::new(),
        })
        .collect()
}

/// Declared disk space in MiB, or the plan default when unset
fn disk_space_mb_or_default(
    resource: &Resource,
    params: &ServicePlanParameters,
) -> ProviderResult<i64> {
    let declared = resource.get_str("disk_space");
    if declared.is_empty() {
        return Ok(params.disk_size_mb_default);
    }
    parse_disk_space_mb(declared).map_err(ProviderError::new)
}

fn string(v: &str) -> Value {
    Value::String(v.to_string())
}

fn human_mb(mb: i64) -> Value {
    Value::String(human_readable_byte_size(mb * MIB))
}

fn components_value(components: &[ServiceComponent]) -> Value {
    Value::List(
        components
            .iter()
            .map(|c| {
                let mut map = HashMap::from([
                    ("component".to_string(), Value::String(c.component.clone())),
                    ("host".to_string(), Value::String(c.host.clone())),
                    ("port".to_string(), Value::Int(c.port)),
                    ("route".to_string(), Value::String(c.route.clone())),
                    ("usage".to_string(), Value::String(c.usage.clone())),
                ]);
                if let Some(ssl) = c.ssl {
                    map.insert("ssl".to_string(), Value::Bool(ssl));
                }
                if let Some(method) = &c.kafka_authentication_method {
                    map.insert(
                        "kafka_authentication_method".to_string(),
                        Value::String(method.clone()),
                    );
                }
                Value::Map(map)
            })
            .collect(),
    )
}

/// The computed `<type>` block
fn connection_info_value(service_type: &str, info: &ConnectionInfo) -> Value {
    let mut props: HashMap<String, Value> = HashMap::new();

    match service_type {
        "opensearch" => {
            props.insert(
                "opensearch_dashboards_uri".to_string(),
                string(&info.opensearch_dashboards_uri),
            );
        }
        "elasticsearch" => {
            props.insert("kibana_uri".to_string(), string(&info.kibana_uri));
        }
        "influxdb" => {
            props.insert("database_name".to_string(), string(&info.influxdb_database_name));
        }
        "kafka" => {
            props.insert("access_cert".to_string(), string(&info.kafka_access_cert));
            props.insert("access_key".to_string(), string(&info.kafka_access_key));
            props.insert("connect_uri".to_string(), string(&info.kafka_connect_uri));
            props.insert("rest_uri".to_string(), string(&info.kafka_rest_uri));
            props.insert(
                "schema_registry_uri".to_string(),
                string(&info.schema_registry_uri),
            );
        }
        "pg" => {
            if let Some(uri) = info.postgres_uris.first() {
                props.insert("uri".to_string(), string(uri));
            }
            if let Some(params) = info.postgres_params.first() {
                props.insert("dbname".to_string(), string(&params.database_name));
                props.insert("host".to_string(), string(&params.host));
                props.insert("password".to_string(), string(&params.password));
                if let Ok(port) = params.port.parse::<i64>() {
                    props.insert("port".to_string(), Value::Int(port));
                }
                props.insert("sslmode".to_string(), string(&params.sslmode));
                props.insert("user".to_string(), string(&params.user));
            }
            props.insert("replica_uri".to_string(), string(&info.postgres_replica_uri));
        }
        "flink" => {
            props.insert(
                "host_ports".to_string(),
                Value::List(info.flink_host_ports.iter().map(|h| string(h)).collect()),
            );
        }
        _ => {}
    }

    Value::List(vec![Value::Map(props)])
}

/// Copy a fetched service into state attributes
pub fn service_attributes(
    project: &str,
    service: &Service,
    params: &ServicePlanParameters,
    declared: Option<&Resource>,
) -> HashMap<String, Value> {
    let service_type = service.service_type.as_str();

    let mut attrs = HashMap::from([
        ("project".to_string(), string(project)),
        ("service_name".to_string(), string(&service.name)),
        ("cloud_name".to_string(), string(&service.cloud_name)),
        ("plan".to_string(), string(&service.plan)),
        ("service_type".to_string(), string(service_type)),
        ("state".to_string(), string(&service.state)),
        (
            "termination_protection".to_string(),
            Value::Bool(service.termination_protection),
        ),
        (
            "maintenance_window_dow".to_string(),
            string(&service.maintenance_window.day_of_week),
        ),
        (
            "maintenance_window_time".to_string(),
            string(&service.maintenance_window.time_of_day),
        ),
        ("disk_space".to_string(), human_mb(service.disk_space_mb)),
        (
            "disk_space_default".to_string(),
            human_mb(params.disk_size_mb_default),
        ),
        ("disk_space_step".to_string(), human_mb(params.disk_size_mb_step)),
        ("disk_space_cap".to_string(), human_mb(params.disk_size_mb_max)),
        ("service_uri".to_string(), string(&service.uri)),
        (
            "service_host".to_string(),
            string(service.uri_params.get("host").map(String::as_str).unwrap_or_default()),
        ),
        (
            "service_port".to_string(),
            Value::Int(
                service
                    .uri_params
                    .get("port")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(0),
            ),
        ),
        ("components".to_string(), components_value(&service.components)),
        (
            service_type.to_string(),
            connection_info_value(service_type, &service.connection_info),
        ),
    ]);

    if let Some(vpc) = &service.project_vpc_id {
        attrs.insert(
            "project_vpc_id".to_string(),
            string(&build_resource_id(&[project, vpc])),
        );
    }
    if let Some(password) = service.uri_params.get("password") {
        attrs.insert("service_password".to_string(), string(password));
    }
    if let Some(user) = service.uri_params.get("user") {
        attrs.insert("service_username".to_string(), string(user));
    }

    let key = user_config_key(service_type);
    let declared_config = declared.and_then(|r| r.attributes.get(&key));
    attrs.insert(key, user_config_from_json(&service.user_config, declared_config));

    attrs
}

impl AivenProvider {
    async fn plan_parameters(
        &self,
        project: &str,
        service_type: &str,
        plan: &str,
        cloud: &str,
    ) -> ProviderResult<ServicePlanParameters> {
        get_plan_parameters(self.api(), project, service_type, plan, cloud)
            .await
            .map_err(|e| ProviderError::new(format!("unable to get service plan parameters: {}", e)))
    }

    /// Build state from a fetched service
    async fn service_state(
        &self,
        id: &ResourceId,
        project: &str,
        service: &Service,
        declared: Option<&Resource>,
    ) -> ProviderResult<State> {
        let params = self
            .plan_parameters(project, &service.service_type, &service.plan, &service.cloud_name)
            .await?;
        let mut attrs = service_attributes(project, service, &params, declared);
        if let Some(declared) = declared {
            merge_declared(&mut attrs, declared);
        }
        Ok(State::existing(id.clone(), attrs)
            .with_identifier(build_resource_id(&[project, &service.name])))
    }

    pub async fn read_service(
        &self,
        id: &ResourceId,
        identifier: &str,
        declared: Option<&Resource>,
    ) -> ProviderResult<State> {
        let (project, service_name) = split_service_id(identifier)?;
        let service = match self.api().get_service(project, service_name).await {
            Ok(service) => service,
            Err(e) if e.is_not_found() => {
                log::debug!("service {} no longer exists", identifier);
                return Ok(State::not_found(id.clone()));
            }
            Err(e) => return Err(api_error(format!("unable to GET service {}", identifier), e)),
        };
        self.service_state(id, project, &service, declared).await
    }

    pub async fn create_service(&self, resource: &Resource) -> ProviderResult<State> {
        let service_type = declared_service_type(resource);
        let project = resource.get_str("project");
        let service_name = resource.get_str("service_name");
        let cloud = resource.get_str("cloud_name");
        let plan = resource.get_str("plan");
        let timeouts = Timeouts::default()
            .for_resource(resource)
            .map_err(ProviderError::new)?;

        let params = self.plan_parameters(project, service_type, plan, cloud).await?;
        let request = CreateServiceRequest {
            cloud: cloud.to_string(),
            disk_space_mb: disk_space_mb_or_default(resource, &params)?,
            maintenance_window: maintenance_window(resource),
            plan: plan.to_string(),
            project_vpc_id: project_vpc_id(resource)?,
            service_integrations: service_integrations(resource),
            service_name: service_name.to_string(),
            service_type: service_type.to_string(),
            termination_protection: resource.get_bool("termination_protection"),
            user_config: user_config_to_json(resource.attributes.get(&user_config_key(service_type))),
        };

        log::info!("creating {} service {}/{}", service_type, project, service_name);
        self.api()
            .create_service(project, request)
            .await
            .map_err(|e| api_error(format!("unable to create service {}/{}", project, service_name), e))?;

        let service = ServiceChangeWaiter::new(self.api(), project, service_name, Operation::Create)
            .wait(timeouts.create, self.wait_settings())
            .await
            .map_err(ProviderError::new)?;

        self.service_state(&resource.id, project, &service, Some(resource))
            .await
    }

    pub async fn update_service(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let (project, service_name) = split_service_id(identifier)?;
        let service_type = match declared_service_type(to) {
            "" => from.get_str("service_type"),
            t => t,
        };
        let or_current = |key: &str| match to.get_str(key) {
            "" => from.get_str(key).to_string(),
            v => v.to_string(),
        };
        let cloud = or_current("cloud_name");
        let plan = or_current("plan");
        let timeouts = Timeouts::default()
            .for_resource(to)
            .map_err(ProviderError::new)?;

        let params = self.plan_parameters(project, service_type, &plan, &cloud).await?;
        let request = UpdateServiceRequest {
            cloud,
            disk_space_mb: disk_space_mb_or_default(to, &params)?,
            maintenance_window: maintenance_window(to),
            plan,
            project_vpc_id: project_vpc_id(to)?,
            powered: true,
            termination_protection: to.get_bool("termination_protection"),
            user_config: user_config_to_json(to.attributes.get(&user_config_key(service_type))),
        };

        log::info!("updating service {}", identifier);
        self.api()
            .update_service(project, service_name, request)
            .await
            .map_err(|e| api_error(format!("unable to update service {}", identifier), e))?;

        let service = ServiceChangeWaiter::new(self.api(), project, service_name, Operation::Update)
            .wait(timeouts.update, self.wait_settings())
            .await
            .map_err(ProviderError::new)?;

        self.service_state(id, project, &service, Some(to)).await
    }

    pub async fn delete_service(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (project, service_name) = split_service_id(identifier)?;
        log::info!("deleting service {}", identifier);
        match self.api().delete_service(project, service_name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                log::debug!("{} was already gone", id);
                Ok(())
            }
            Err(e) => Err(api_error(format!("unable to delete service {}", identifier), e)),
        }
    }

    pub async fn import_service(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        if identifier.split('/').count() != 2 {
            return Err(ProviderError::new(format!(
                "invalid identifier {}, expected <project_name>/<service_name>",
                identifier
            )));
        }
        let (project, service_name) = split_service_id(identifier)?;
        let service = self
            .api()
            .get_service(project, service_name)
            .await
            .map_err(|e| api_error(format!("unable to GET service {}", identifier), e))?;
        self.service_state(id, project, &service, None).await
    }

    /// Look a service up by project and name
    pub async fn read_service_data_source(&self, resource: &Resource) -> ProviderResult<State> {
        let project = resource.get_str("project");
        let service_name = resource.get_str("service_name");
        let services = self
            .api()
            .list_services(project)
            .await
            .map_err(|e| api_error(format!("unable to list services in {}", project), e))?;

        let service = services
            .into_iter()
            .find(|s| s.name == service_name)
            .ok_or_else(|| {
                ProviderError::new(format!("service {}/{} not found", project, service_name))
            })?;

        if resource.id.resource_type != GENERIC_SERVICE
            && service.service_type != resource.id.resource_type
        {
            return Err(ProviderError::new(format!(
                "service {}/{} is of type {}, not {}",
                project, service_name, service.service_type, resource.id.resource_type
            )));
        }

        self.service_state(&resource.id, project, &service, None)
            .await
    }

    /// Checks run at plan time before a change is submitted
    pub async fn validate_service_change(
        &self,
        desired: &Resource,
        current: &State,
    ) -> ProviderResult<()> {
        if current.exists {
            let observed_type = current.get_str("service_type");
            let declared_type = declared_service_type(desired);
            if desired.id.resource_type != GENERIC_SERVICE
                && !observed_type.is_empty()
                && observed_type != declared_type
            {
                return Err(ProviderError::new(format!(
                    "failed service type check: service is of type '{}', not '{}'",
                    observed_type, declared_type
                )));
            }

            let declared = desired
                .attributes
                .get("service_integrations")
                .and_then(Value::as_list)
                .unwrap_or_default();
            let recorded = current
                .attributes
                .get("service_integrations")
                .and_then(Value::as_list)
                .unwrap_or_default();
            if !declared.is_empty() && declared != recorded {
                return Err(ProviderError::new(
                    "failed service integration check: service_integrations field can only be set during creation of a service",
                ));
            }
        }

        let disk_space = desired.get_str("disk_space");
        if disk_space.is_empty() {
            return Ok(());
        }
        let lookup_keys = ["project", "plan", "cloud_name"];
        if lookup_keys.iter().any(|k| {
            desired
                .attributes
                .get(*k)
                .is_some_and(Value::has_unresolved_ref)
        }) {
            log::debug!("{}: disk space check deferred until apply", desired.id);
            return Ok(());
        }

        let params = self
            .plan_parameters(
                desired.get_str("project"),
                declared_service_type(desired),
                desired.get_str("plan"),
                desired.get_str("cloud_name"),
            )
            .await
            .map_err(|e| ProviderError::new(format!("failed disk space check: {}", e.message)))?;
        let requested = disk_space_mb_or_default(desired, &params)?;
        check_disk_size(&params, requested).map_err(|e| {
            ProviderError::new(format!("failed disk space check: disk size check failed: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CLOUD, MockApi, running_service};
    use crate::waiter::WaitSettings;
    use std::sync::Arc;
    use std::time::Duration;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn provider(api: Arc<MockApi>) -> AivenProvider {
        AivenProvider::with_api(api).with_wait_settings(WaitSettings {
            delay: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
        })
    }

    fn pg(name: &str) -> Resource {
        Resource::new("pg", name)
            .with_attribute("project", s("acme"))
            .with_attribute("service_name", s("orders-db"))
            .with_attribute("cloud_name", s(CLOUD))
            .with_attribute("plan", s("startup-4"))
    }

    fn block(entries: Vec<(&str, Value)>) -> Value {
        Value::List(vec![Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )])
    }

    #[tokio::test]
    async fn create_submits_request_and_reads_back() {
        let api = Arc::new(MockApi::new());
        let resource = pg("db")
            .with_attribute("disk_space", s("110GiB"))
            .with_attribute("maintenance_window_dow", s("monday"))
            .with_attribute("maintenance_window_time", s("10:00:00"))
            .with_attribute("project_vpc_id", s("acme/vpc-1"))
            .with_attribute("termination_protection", Value::Bool(true))
            .with_attribute(
                "pg_user_config",
                block(vec![
                    ("pg_version", s("15")),
                    ("ip_filter", Value::List(vec![s("192.168.0.0/16"), s("10.0.0.0/8")])),
                ]),
            );

        let state = provider(api.clone()).create_service(&resource).await.unwrap();

        let request = api.created.lock().unwrap()[0].clone();
        assert_eq!(request.disk_space_mb, 112640);
        assert_eq!(request.project_vpc_id.as_deref(), Some("vpc-1"));
        assert_eq!(request.service_type, "pg");
        assert_eq!(request.maintenance_window.unwrap().day_of_week, "monday");
        assert_eq!(request.user_config["pg_version"], "15");

        assert_eq!(state.identifier.as_deref(), Some("acme/orders-db"));
        assert_eq!(state.get_str("state"), "RUNNING");
        assert_eq!(state.get_str("disk_space"), "110GiB");
        assert_eq!(state.get_str("disk_space_default"), "80GiB");
        assert_eq!(state.get_str("disk_space_step"), "30GiB");
        assert_eq!(state.get_str("disk_space_cap"), "240GiB");
        assert_eq!(state.get_str("project_vpc_id"), "acme/vpc-1");
        assert_eq!(state.get_str("service_username"), "avnadmin");
        assert_eq!(state.attributes["service_port"], Value::Int(12691));

        // The API sorts ip filters; state keeps the declared order
        let config = state.attributes["pg_user_config"].as_list().unwrap()[0]
            .as_map()
            .unwrap()
            .clone();
        assert_eq!(
            config["ip_filter"],
            Value::List(vec![s("192.168.0.0/16"), s("10.0.0.0/8")])
        );

        let pg_block = state.attributes["pg"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(pg_block["dbname"], s("defaultdb"));
        assert_eq!(pg_block["port"], Value::Int(12691));
    }

    #[tokio::test]
    async fn create_uses_plan_default_disk_and_skips_partial_window() {
        let api = Arc::new(MockApi::new());
        let resource = pg("db").with_attribute("maintenance_window_dow", s("monday"));
        provider(api.clone()).create_service(&resource).await.unwrap();

        let request = api.created.lock().unwrap()[0].clone();
        assert_eq!(request.disk_space_mb, 81920);
        assert!(request.maintenance_window.is_none());
        assert!(request.project_vpc_id.is_none());
    }

    #[tokio::test]
    async fn create_with_read_replica_integration() {
        let api = Arc::new(MockApi::new());
        let resource = Resource::new("pg", "replica")
            .with_attribute("project", s("acme"))
            .with_attribute("service_name", s("orders-replica"))
            .with_attribute("cloud_name", s(CLOUD))
            .with_attribute("plan", s("startup-4"))
            .with_attribute(
                "service_integrations",
                block(vec![
                    ("integration_type", s("read_replica")),
                    ("source_service_name", s("orders-db")),
                ]),
            );
        let state = provider(api.clone()).create_service(&resource).await.unwrap();

        let request = api.created.lock().unwrap()[0].clone();
        assert_eq!(request.service_integrations.len(), 1);
        assert_eq!(request.service_integrations[0].source_service, "orders-db");
        // Not reported by the API, kept from the declaration
        assert!(state.attributes.contains_key("service_integrations"));
    }

    #[tokio::test]
    async fn generic_service_takes_type_from_attribute() {
        let api = Arc::new(MockApi::new());
        let resource = Resource::new("service", "events")
            .with_attribute("project", s("acme"))
            .with_attribute("service_name", s("events"))
            .with_attribute("service_type", s("kafka"))
            .with_attribute("cloud_name", s(CLOUD))
            .with_attribute("plan", s("startup-4"));
        let state = provider(api.clone()).create_service(&resource).await.unwrap();

        assert_eq!(api.created.lock().unwrap()[0].service_type, "kafka");
        assert_eq!(state.get_str("service_type"), "kafka");
        let kafka = state.attributes["kafka"].as_list().unwrap()[0].as_map().unwrap();
        assert!(kafka.contains_key("access_cert"));
        assert!(state.attributes.contains_key("kafka_user_config"));
    }

    #[tokio::test]
    async fn create_fails_when_plan_is_unknown() {
        let api = Arc::new(MockApi::new());
        let resource = pg("db").with_attribute("plan", s("premium-64"));
        let err = provider(api.clone()).create_service(&resource).await.unwrap_err();
        assert!(err.message.starts_with("unable to get service plan parameters: "));
        assert!(api.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_missing_service_is_not_found() {
        let provider = provider(Arc::new(MockApi::new()));
        let state = provider
            .read_service(&ResourceId::new("pg", "db"), "acme/missing", None)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn update_sends_powered_request_and_waits() {
        let api = Arc::new(
            MockApi::new().with_service("acme", running_service("acme", "orders-db", "pg")),
        );
        let provider = provider(api.clone());
        let id = ResourceId::new("pg", "db");
        let from = provider
            .read_service(&id, "acme/orders-db", None)
            .await
            .unwrap();

        let to = pg("db")
            .with_attribute("plan", s("startup-4"))
            .with_attribute("disk_space", s("140GiB"))
            .with_attribute("termination_protection", Value::Bool(true));
        let state = provider
            .update_service(&id, "acme/orders-db", &from, &to)
            .await
            .unwrap();

        let request = api.updated.lock().unwrap()[0].clone();
        assert!(request.powered);
        assert_eq!(request.disk_space_mb, 143360);
        assert_eq!(state.attributes["termination_protection"], Value::Bool(true));
        assert_eq!(state.get_str("disk_space"), "140GiB");
    }

    #[tokio::test]
    async fn delete_ignores_missing_service() {
        let api = Arc::new(
            MockApi::new().with_service("acme", running_service("acme", "orders-db", "pg")),
        );
        let provider = provider(api.clone());
        let id = ResourceId::new("pg", "db");
        provider.delete_service(&id, "acme/orders-db").await.unwrap();
        provider.delete_service(&id, "acme/orders-db").await.unwrap();
        assert_eq!(api.deleted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_validates_identifier() {
        let api = Arc::new(
            MockApi::new().with_service("acme", running_service("acme", "orders-db", "pg")),
        );
        let provider = provider(api);
        let id = ResourceId::new("pg", "db");

        let err = provider.import_service(&id, "orders-db").await.unwrap_err();
        assert_eq!(
            err.message,
            "invalid identifier orders-db, expected <project_name>/<service_name>"
        );

        let state = provider.import_service(&id, "acme/orders-db").await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some("acme/orders-db"));
        assert_eq!(state.get_str("plan"), "startup-4");

        let err = provider.import_service(&id, "acme/other").await.unwrap_err();
        assert!(err.message.starts_with("unable to GET service acme/other: "));
    }

    #[tokio::test]
    async fn data_source_finds_service_by_name() {
        let api = Arc::new(
            MockApi::new()
                .with_service("acme", running_service("acme", "logs", "opensearch"))
                .with_service("acme", running_service("acme", "orders-db", "pg")),
        );
        let provider = provider(api);
        let lookup = |t: &str, name: &str| {
            Resource::new(t, "search")
                .with_attribute("project", s("acme"))
                .with_attribute("service_name", s(name))
                .with_read_only(true)
        };

        let state = provider
            .read_service_data_source(&lookup("opensearch", "logs"))
            .await
            .unwrap();
        assert_eq!(state.get_str("service_type"), "opensearch");
        assert_eq!(state.get_str("cloud_name"), CLOUD);
        assert!(state.attributes.contains_key("opensearch"));

        let err = provider
            .read_service_data_source(&lookup("opensearch", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.message, "service acme/missing not found");

        let err = provider
            .read_service_data_source(&lookup("opensearch", "orders-db"))
            .await
            .unwrap_err();
        assert!(err.message.contains("is of type pg"));
    }

    #[tokio::test]
    async fn disk_space_is_checked_against_plan() {
        let provider = provider(Arc::new(MockApi::new()));
        let absent = State::not_found(ResourceId::new("pg", "db"));

        let ok = pg("db").with_attribute("disk_space", s("110GiB"));
        assert!(provider.validate_service_change(&ok, &absent).await.is_ok());

        let misaligned = pg("db").with_attribute("disk_space", s("90GiB"));
        let err = provider
            .validate_service_change(&misaligned, &absent)
            .await
            .unwrap_err();
        assert_eq!(
            err.message,
            "failed disk space check: disk size check failed: requested disk size has to increase from: '80GiB' in increments of '30GiB'"
        );

        let deferred = pg("db")
            .with_attribute("disk_space", s("90GiB"))
            .with_attribute("plan", Value::ResourceRef("base".to_string(), "plan".to_string()));
        assert!(provider.validate_service_change(&deferred, &absent).await.is_ok());

        assert!(provider.validate_service_change(&pg("db"), &absent).await.is_ok());
    }

    #[tokio::test]
    async fn integrations_only_at_creation() {
        let provider = provider(Arc::new(MockApi::new()));
        let integration = block(vec![
            ("integration_type", s("read_replica")),
            ("source_service_name", s("orders-db")),
        ]);
        let desired = pg("replica").with_attribute("service_integrations", integration.clone());

        let absent = State::not_found(desired.id.clone());
        assert!(provider.validate_service_change(&desired, &absent).await.is_ok());

        let existing = State::existing(
            desired.id.clone(),
            HashMap::from([("service_type".to_string(), s("pg"))]),
        );
        let err = provider
            .validate_service_change(&desired, &existing)
            .await
            .unwrap_err();
        assert!(err.message.starts_with("failed service integration check: "));

        let mut recorded = existing.clone();
        recorded
            .attributes
            .insert("service_integrations".to_string(), integration);
        assert!(provider.validate_service_change(&desired, &recorded).await.is_ok());
    }

    #[tokio::test]
    async fn typed_resource_cannot_change_service_type() {
        let provider = provider(Arc::new(MockApi::new()));
        let desired = pg("db");
        let existing = State::existing(
            desired.id.clone(),
            HashMap::from([("service_type".to_string(), s("mysql"))]),
        );
        let err = provider
            .validate_service_change(&desired, &existing)
            .await
            .unwrap_err();
        assert!(err.message.starts_with("failed service type check"));
    }
}
