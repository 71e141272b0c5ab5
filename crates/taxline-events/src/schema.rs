//! Writer schema of the business update topic.

/// Avro schema of `businesses.fct.Update` values.
///
/// Only `businessId`, `actionType` and `rut` are read; the business profile fields
/// are needed to walk the datum.
pub const BUSINESS_UPDATE_SCHEMA: &str = r#"
{
    "type": "record",
    "name": "Update",
    "namespace": "businesses.fct",
    "fields": [
        {"name": "businessId", "type": "int"},
        {"name": "actionType", "type": "string"},
        {"name": "rut", "type": "string"},
        {"name": "mobileDefaultChannel", "type": "string"},
        {"name": "name", "type": ["string", "null"]},
        {"name": "team", "type": ["string", "null"]},
        {"name": "fantasyName", "type": ["string", "null"]},
        {"name": "legalName", "type": ["string", "null"]},
        {"name": "phone", "type": ["string", "null"]},
        {"name": "email", "type": ["string", "null"]},
        {"name": "address", "type": ["string", "null"]},
        {"name": "commune", "type": ["string", "null"]},
        {"name": "economicActivity", "type": ["string", "null"]},
        {"name": "status", "type": ["int", "null"]},
        {"name": "adminUserId", "type": ["int", "null"]},
        {"name": "clientDocumentDayExpiration", "type": ["int", "null"]},
        {"name": "providerDocumentDayExpiration", "type": ["int", "null"]},
        {"name": "deletedAt", "type": ["long", "null"]},
        {"name": "adminUser", "type": ["null", {
            "type": "record",
            "name": "adminUserRecord",
            "fields": [
                {"name": "adminUserId", "type": "int"},
                {"name": "name", "type": ["string", "null"]},
                {"name": "email", "type": ["string", "null"]}
            ]
        }]},
        {"name": "subscriptions", "type": {
            "type": "array",
            "items": {
                "type": "record",
                "name": "subscription",
                "fields": [
                    {"name": "subscriptionId", "type": "int"},
                    {"name": "active", "type": ["boolean", "null"]},
                    {"name": "planId", "type": ["int", "null"]},
                    {"name": "deletedAt", "type": ["long", "null"]}
                ]
            }
        }},
        {"name": "users", "type": {
            "type": "array",
            "items": {
                "type": "record",
                "name": "user",
                "fields": [
                    {"name": "userId", "type": "int"},
                    {"name": "rut", "type": ["string", "null"]},
                    {"name": "role", "type": ["string", "null"]},
                    {"name": "uid", "type": ["string", "null"]},
                    {"name": "name", "type": ["string", "null"]},
                    {"name": "email", "type": ["string", "null"]},
                    {"name": "phone", "type": ["string", "null"]},
                    {"name": "messagePreferences", "type": {
                        "type": "array",
                        "items": {
                            "type": "record",
                            "name": "messagePreference",
                            "fields": [
                                {"name": "userId", "type": "int"},
                                {"name": "channels", "type": {"type": "array", "items": "string"}},
                                {"name": "subscribed", "type": "boolean"},
                                {"name": "messagesEventId", "type": "int"},
                                {"name": "eventName", "type": "string"}
                            ]
                        }
                    }}
                ]
            }
        }},
        {"name": "settings", "type": {
            "type": "array",
            "items": {
                "type": "record",
                "name": "setting",
                "fields": [
                    {"name": "settingId", "type": "int"},
                    {"name": "active", "type": ["boolean", "null"]},
                    {"name": "key", "type": ["string", "null"]},
                    {"name": "name", "type": ["string", "null"]},
                    {"name": "value", "type": ["int", "null"]},
                    {"name": "visualized", "type": ["boolean", "null"]},
                    {"name": "businessId", "type": ["int", "null"]}
                ]
            }
        }}
    ]
}
"#;
