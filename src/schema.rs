//! Declarative command schemas and the generic validator that consumes them.
//!
//! Each command lists its required and optional parameters once; a single
//! validator enforces presence and rejects undeclared keys before anything is
//! signed or sent.

use std::collections::HashMap;

use crate::error::ApiError;
use crate::request::CommandRequest;

/// Command used to query the status of an asynchronous job.
pub const QUERY_ASYNC_JOB_RESULT: &str = "queryAsyncJobResult";

/// Parameter schema for a single command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CommandSchema {
    /// Command name as sent to the server.
    pub name: &'static str,
    /// Parameters that must be present and non-empty, checked in order.
    pub required: &'static [&'static str],
    /// Parameters that may be supplied.
    pub optional: &'static [&'static str],
    /// Whether the command normally answers with a job identifier.
    pub asynchronous: bool,
}

impl CommandSchema {
    fn declares(&self, key: &str) -> bool {
        let base = key.split_once('[').map_or(key, |(head, _)| head);
        self.required
            .iter()
            .chain(self.optional)
            .any(|declared| declared.eq_ignore_ascii_case(base))
    }
}

/// Returns `true` when `request` supplies `field`, either directly or as a
/// map-style entry such as `tags[0].key`.
fn supplies(request: &CommandRequest, field: &str) -> bool {
    request.parameters().iter().any(|(key, _)| {
        let base = key.split_once('[').map_or(key.as_str(), |(head, _)| head);
        base.eq_ignore_ascii_case(field)
    })
}

const BUILTIN: &[CommandSchema] = &[
    CommandSchema {
        name: QUERY_ASYNC_JOB_RESULT,
        required: &["jobid"],
        optional: &[],
        asynchronous: false,
    },
    CommandSchema {
        name: "listZones",
        required: &[],
        optional: &["available", "domainid", "id", "keyword", "name", "showcapacities"],
        asynchronous: false,
    },
    CommandSchema {
        name: "deployVirtualMachine",
        required: &["serviceofferingid", "templateid", "zoneid"],
        optional: &[
            "account",
            "affinitygroupids",
            "diskofferingid",
            "displayname",
            "domainid",
            "group",
            "hypervisor",
            "keypair",
            "name",
            "networkids",
            "projectid",
            "securitygroupids",
            "size",
            "startvm",
            "userdata",
            "details",
        ],
        asynchronous: true,
    },
    CommandSchema {
        name: "startVirtualMachine",
        required: &["id"],
        optional: &["hostid"],
        asynchronous: true,
    },
    CommandSchema {
        name: "stopVirtualMachine",
        required: &["id"],
        optional: &["forced"],
        asynchronous: true,
    },
    CommandSchema {
        name: "rebootVirtualMachine",
        required: &["id"],
        optional: &[],
        asynchronous: true,
    },
    CommandSchema {
        name: "destroyVirtualMachine",
        required: &["id"],
        optional: &["expunge", "volumeids"],
        asynchronous: true,
    },
    CommandSchema {
        name: "createVolume",
        required: &["name"],
        optional: &[
            "account",
            "diskofferingid",
            "domainid",
            "projectid",
            "size",
            "snapshotid",
            "virtualmachineid",
            "zoneid",
        ],
        asynchronous: true,
    },
    CommandSchema {
        name: "attachVolume",
        required: &["id", "virtualmachineid"],
        optional: &["deviceid"],
        asynchronous: true,
    },
    CommandSchema {
        name: "detachVolume",
        required: &[],
        optional: &["deviceid", "id", "virtualmachineid"],
        asynchronous: true,
    },
    CommandSchema {
        name: "createNetwork",
        required: &["displaytext", "name", "networkofferingid", "zoneid"],
        optional: &[
            "account",
            "domainid",
            "endip",
            "gateway",
            "netmask",
            "projectid",
            "startip",
            "vlan",
            "vpcid",
        ],
        asynchronous: false,
    },
    CommandSchema {
        name: "createTags",
        required: &["resourceids", "resourcetype", "tags"],
        optional: &["customer"],
        asynchronous: true,
    },
];

/// Registry of command schemas keyed by lowercased command name.
#[derive(Clone, Debug, Default)]
pub struct CommandSchemas {
    schemas: HashMap<String, CommandSchema>,
}

impl CommandSchemas {
    /// Returns an empty registry; every command passes validation.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns a registry populated with the built-in command schemas.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        for schema in BUILTIN {
            registry.register(*schema);
        }
        registry
    }

    /// Adds or replaces the schema for `schema.name`.
    pub fn register(&mut self, schema: CommandSchema) {
        self.schemas.insert(schema.name.to_lowercase(), schema);
    }

    /// Looks up the schema for `command`, ignoring case.
    #[must_use]
    pub fn get(&self, command: &str) -> Option<&CommandSchema> {
        self.schemas.get(&command.to_lowercase())
    }

    /// Validates `request` against its schema, if one is registered.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidArgument`] naming the first missing required
    /// parameter in schema order, or the first undeclared parameter.
    pub fn validate(&self, request: &CommandRequest) -> Result<(), ApiError> {
        if request.name().is_empty() {
            return Err(ApiError::invalid("command name must not be empty"));
        }
        let Some(schema) = self.get(request.name()) else {
            return Ok(());
        };

        if let Some(missing) = schema
            .required
            .iter()
            .find(|field| !supplies(request, field))
        {
            return Err(ApiError::invalid(format!(
                "{} requires parameter '{missing}'",
                schema.name
            )));
        }

        if let Some((unknown, _)) = request
            .parameters()
            .iter()
            .find(|(key, _)| !schema.declares(key))
        {
            return Err(ApiError::invalid(format!(
                "{} does not accept parameter '{unknown}'",
                schema.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn deploy_request() -> CommandRequest {
        CommandRequest::new("deployVirtualMachine")
            .param("serviceOfferingId", "so-1")
            .param("templateId", "tpl-1")
            .param("zoneId", "z-1")
    }

    #[test]
    fn accepts_complete_request() {
        let schemas = CommandSchemas::builtin();
        assert_eq!(schemas.validate(&deploy_request()), Ok(()));
    }

    #[rstest]
    #[case("serviceofferingid")]
    #[case("templateid")]
    #[case("zoneid")]
    fn rejects_each_missing_required_field(#[case] dropped: &str) {
        let full = deploy_request();
        let pruned = CommandRequest::new(full.name()).params(
            full.parameters()
                .iter()
                .filter(|(key, _)| key != dropped)
                .map(|(key, value)| (key.as_str(), value.clone())),
        );

        let err = CommandSchemas::builtin()
            .validate(&pruned)
            .expect_err("missing field should be rejected");
        assert!(
            matches!(err, ApiError::InvalidArgument(ref message) if message.contains(dropped)),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn empty_values_count_as_missing() {
        let request = CommandRequest::new("startVirtualMachine").param("id", "");
        let err = CommandSchemas::builtin()
            .validate(&request)
            .expect_err("empty id should be rejected");
        assert_eq!(
            err,
            ApiError::InvalidArgument(String::from(
                "startVirtualMachine requires parameter 'id'"
            ))
        );
    }

    #[test]
    fn rejects_undeclared_parameters() {
        let request = deploy_request().param("colour", "blue");
        let err = CommandSchemas::builtin()
            .validate(&request)
            .expect_err("unknown parameter should be rejected");
        assert!(err.to_string().contains("colour"), "unexpected error: {err}");
    }

    #[test]
    fn map_parameters_match_on_their_base_name() {
        let request = deploy_request().param("details[0].cpuNumber", "2");
        assert_eq!(CommandSchemas::builtin().validate(&request), Ok(()));
    }

    #[test]
    fn map_parameters_satisfy_required_fields() {
        let request = CommandRequest::new("createTags")
            .param("resourceIds", "vm-1")
            .param("resourceType", "UserVm")
            .param("tags[0].key", "env")
            .param("tags[0].value", "prod");
        assert_eq!(CommandSchemas::builtin().validate(&request), Ok(()));
    }

    #[test]
    fn map_prefix_must_end_at_the_bracket() {
        let request = CommandRequest::new("createTags")
            .param("resourceids", "vm-1")
            .param("resourcetype", "UserVm")
            .param("tagset[0].key", "env");
        let err = CommandSchemas::builtin()
            .validate(&request)
            .expect_err("tagset is not tags");
        assert_eq!(
            err,
            ApiError::InvalidArgument(String::from("createTags requires parameter 'tags'"))
        );
    }

    #[test]
    fn unknown_commands_pass_through() {
        let request = CommandRequest::new("listCapabilities").param("anything", "goes");
        assert_eq!(CommandSchemas::builtin().validate(&request), Ok(()));
    }

    #[test]
    fn lookup_ignores_case() {
        let schemas = CommandSchemas::builtin();
        let schema = schemas
            .get("QUERYASYNCJOBRESULT")
            .unwrap_or_else(|| panic!("job query schema registered"));
        assert_eq!(schema.required, &["jobid"]);
        assert!(schemas.get("deployvirtualmachine").is_some_and(|s| s.asynchronous));
    }

    #[test]
    fn register_adds_custom_commands() {
        let mut schemas = CommandSchemas::empty();
        schemas.register(CommandSchema {
            name: "scaleSystemVm",
            required: &["id", "serviceofferingid"],
            optional: &[],
            asynchronous: true,
        });
        let request = CommandRequest::new("scaleSystemVm").param("id", "vm-1");
        assert!(schemas.validate(&request).is_err());
    }
}
