use super::QueueMigration;

pub const M000001_MIGRATION: QueueMigration = QueueMigration {
    name: "m000001",
    stmts: &[
        r#"
            create table if not exists jobs (
                id text primary key,
                command text not null,
                state text not null,
                attempts integer not null default 0,
                max_retries integer not null default 3,
                created_at text not null,
                updated_at text not null,
                available_at integer not null,
                worker text
            );
        "#,
        r#"
            create table if not exists config (
                key text primary key,
                value text
            );
        "#,
        r#"
            create index if not exists jobs_state_available_at_created_at_idx
                on jobs (state, available_at, created_at);
        "#,
    ],
};
