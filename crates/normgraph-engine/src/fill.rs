//! Default fill: every declared field absent from a batch record receives
//! its declared default. Present fields, declared or not, are untouched.

use normgraph_schema::SchemaGraph;

use crate::tables::NormalizedTables;

pub fn fill_defaults(graph: &SchemaGraph, tables: &mut NormalizedTables) {
    for (entity_name, table) in tables.iter_mut() {
        let Some(entity) = graph.entity(entity_name) else {
            continue;
        };
        for record in table.values_mut() {
            for (field, def) in &entity.fields {
                if !record.contains_key(field) {
                    record.insert(field.clone(), def.default_value());
                }
            }
        }
    }
}
