//! Flink table operations

use std::collections::HashMap;

use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};

use crate::client::{CreateFlinkTableRequest, FlinkTable};
use crate::provider::{AivenProvider, api_error};
use crate::utils::{build_resource_id, merge_declared, split_resource_id};

fn table_attributes(project: &str, service_name: &str, table: &FlinkTable) -> HashMap<String, Value> {
    [
        ("project", project),
        ("service_name", service_name),
        ("integration_id", table.integration_id.as_str()),
        ("table_id", table.table_id.as_str()),
        ("table_name", table.table_name.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
    .collect()
}

impl AivenProvider {
    fn table_state(
        id: &ResourceId,
        project: &str,
        service_name: &str,
        table: &FlinkTable,
        declared: Option<&Resource>,
    ) -> State {
        let mut attrs = table_attributes(project, service_name, table);
        if let Some(declared) = declared {
            merge_declared(&mut attrs, declared);
        }
        State::existing(id.clone(), attrs).with_identifier(build_resource_id(&[
            project,
            service_name,
            &table.table_id,
        ]))
    }

    pub async fn create_flink_table(&self, resource: &Resource) -> ProviderResult<State> {
        let project = resource.get_str("project");
        let service_name = resource.get_str("service_name");
        let field = |key: &str| resource.get_str(key).to_string();

        let request = CreateFlinkTableRequest {
            integration_id: field("integration_id"),
            jdbc_table: field("jdbc_table"),
            connector_type: field("connector_type"),
            kafka_topic: field("kafka_topic"),
            kafka_key_format: field("kafka_key_format"),
            kafka_value_format: field("kafka_value_format"),
            like_options: field("like_options"),
            name: field("table_name"),
            partitioned_by: field("partitioned_by"),
            schema_sql: field("schema_sql"),
        };

        log::info!(
            "creating flink table {} in {}/{}",
            request.name,
            project,
            service_name
        );
        let table = self
            .api()
            .create_flink_table(project, service_name, request)
            .await
            .map_err(|e| api_error("Error creating Flink table", e))?;

        Ok(Self::table_state(
            &resource.id,
            project,
            service_name,
            &table,
            Some(resource),
        ))
    }

    pub async fn read_flink_table(
        &self,
        id: &ResourceId,
        identifier: &str,
        declared: Option<&Resource>,
    ) -> ProviderResult<State> {
        let parts = split_resource_id(identifier, 3).map_err(ProviderError::new)?;
        let (project, service_name, table_id) = (parts[0], parts[1], parts[2]);

        match self
            .api()
            .get_flink_table(project, service_name, table_id)
            .await
        {
            Ok(table) => Ok(Self::table_state(id, project, service_name, &table, declared)),
            Err(e) if e.is_not_found() => Ok(State::not_found(id.clone())),
            Err(e) => Err(api_error(format!("unable to get flink table {}", identifier), e)),
        }
    }

    pub async fn delete_flink_table(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let parts = split_resource_id(identifier, 3).map_err(ProviderError::new)?;
        match self
            .api()
            .delete_flink_table(parts[0], parts[1], parts[2])
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                log::debug!("{} was already gone", id);
                Ok(())
            }
            Err(e) => Err(api_error("Error deleting Flink table", e)),
        }
    }

    pub async fn import_flink_table(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        if identifier.split('/').count() != 3 {
            return Err(ProviderError::new(format!(
                "invalid identifier {}, expected <project_name>/<service_name>/<table_id>",
                identifier
            )));
        }
        let state = self.read_flink_table(id, identifier, None).await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "flink table {} not found",
                identifier
            )));
        }
        Ok(state)
    }
}
