use super::QueueMigration;

pub const M000002_MIGRATION: QueueMigration = QueueMigration {
    name: "m000002",
    stmts: &[
        "alter table jobs add column last_error text;",
        "create index if not exists jobs_state_updated_at_idx on jobs (state, updated_at);",
    ],
};
