//! Database and server property schemas
//!
//! Raw keys are the short names used in topology files; API names are the
//! management-API property names written to the remote system.

use super::{EntityKind, Field, PropValue, Schema, Siblings, Variant};
use crate::compose::ComposeMode;
use crate::error::Result;

/// Scalar types accepted by range indexes
pub const SCALAR_TYPES: &[&str] = &[
    "string",
    "int",
    "unsignedInt",
    "long",
    "unsignedLong",
    "float",
    "double",
    "decimal",
    "dateTime",
    "time",
    "date",
    "gYearMonth",
    "gYear",
    "gMonth",
    "gDay",
    "yearMonthDuration",
    "dayTimeDuration",
    "anyURI",
    "point",
];

pub const SERVER_TYPES: &[&str] = &["http", "xdbc", "odbc", "webdav"];

const INVALID_VALUES: &[&str] = &["ignore", "reject"];

/// Collation assigned to string range indexes
pub const CODEPOINT_COLLATION: &str = "http://marklogic.com/collation/";

/// Raw keys the entity layer handles before parsing
pub const FORESTS_KEY: &str = "forests";

fn collation_for_type(siblings: &Siblings) -> Option<PropValue> {
    let collation = match siblings.get("type").and_then(PropValue::as_str) {
        Some("string") => CODEPOINT_COLLATION,
        _ => "",
    };
    Some(PropValue::string(collation))
}

fn name_from_id(siblings: &Siblings) -> Option<PropValue> {
    siblings.get("id").cloned()
}

/// Fields shared by every range index variant, after the variant's own
fn range_tail() -> Vec<Field> {
    vec![
        Field::string("collation").api("collation").derived(collation_for_type),
        Field::boolean("positions")
            .api("range-value-positions")
            .default_value(PropValue::Boolean(false)),
        Field::enumeration("invalid", INVALID_VALUES)
            .api("invalid-values")
            .default_value(PropValue::string("reject")),
    ]
}

fn range_variant(
    discriminator: &'static str,
    api: &'static str,
    mut fields: Vec<Field>,
) -> Variant {
    fields.extend(range_tail());
    Variant::new(discriminator, api, fields)
}

fn range_type() -> Field {
    Field::enumeration("type", SCALAR_TYPES).api("scalar-type").mandatory()
}

/// Schema of a database declaration
pub fn database_schema() -> Result<Schema> {
    let ranges = Field::multiplex(
        "ranges",
        vec![
            range_variant(
                "path",
                "range-path-index",
                vec![
                    range_type(),
                    Field::string("path").api("path-expression").mandatory(),
                ],
            ),
            range_variant(
                "parent",
                "range-element-attribute-index",
                vec![
                    range_type(),
                    Field::group(
                        "parent",
                        vec![
                            Field::string("namespace")
                                .api("parent-namespace-uri")
                                .default_value(PropValue::string("")),
                            Field::string("name").api("parent-localname").mandatory(),
                        ],
                    ),
                    Field::string("namespace")
                        .api("namespace-uri")
                        .default_value(PropValue::string("")),
                    Field::string("name").api("localname").mandatory(),
                ],
            ),
            range_variant(
                "name",
                "range-element-index",
                vec![
                    range_type(),
                    Field::string("namespace")
                        .api("namespace-uri")
                        .default_value(PropValue::string("")),
                    Field::string("name").api("localname").mandatory(),
                ],
            ),
        ],
    );

    Schema::new(
        EntityKind::Database,
        vec![
            Field::string("id"),
            Field::string("name")
                .api("database-name")
                .derived(name_from_id)
                .frozen(),
            Field::enumeration("compose", ComposeMode::VALUES),
            Field::string("schema").api("schema-database"),
            Field::string("security").api("security-database"),
            Field::string("triggers").api("triggers-database"),
            Field::group(
                "indexes",
                vec![ranges, Field::boolean("triples").api("triple-index")],
            ),
            Field::group(
                "lexicons",
                vec![
                    Field::boolean("uri").api("uri-lexicon"),
                    Field::boolean("coll").api("collection-lexicon"),
                ],
            ),
        ],
    )
}

/// Schema of a server declaration
pub fn server_schema() -> Result<Schema> {
    Schema::new(
        EntityKind::Server,
        vec![
            Field::string("id"),
            Field::enumeration("compose", ComposeMode::VALUES),
            Field::string("name").api("server-name").mandatory().frozen(),
            Field::string("group")
                .api("group-name")
                .default_value(PropValue::string("Default"))
                .frozen(),
            Field::enumeration("type", SERVER_TYPES)
                .api("server-type")
                .mandatory()
                .frozen(),
            Field::integer("port").api("port").mandatory().frozen(),
            Field::string("root").api("root").default_value(PropValue::string("/")),
            Field::string("content").api("content-database"),
            Field::string("modules").api("modules-database"),
            Field::string("rewriter").api("url-rewriter"),
            Field::string("handler").api("error-handler"),
        ],
    )
}
