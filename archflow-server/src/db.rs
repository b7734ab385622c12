use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Packages (transfers, SIPs, DIPs)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS packages (
            id UUID PRIMARY KEY,
            kind VARCHAR(16) NOT NULL,
            current_path TEXT NOT NULL,
            status VARCHAR(16) NOT NULL,
            processing_configuration VARCHAR(255) NOT NULL DEFAULT 'default',
            aip_filename TEXT,
            sip_type VARCHAR(32),
            created_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per executed link
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            package_id UUID NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
            unit_type VARCHAR(16) NOT NULL,
            chain_id VARCHAR(255) NOT NULL,
            link_id VARCHAR(255) NOT NULL,
            kind VARCHAR(64) NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            group_name TEXT NOT NULL DEFAULT '',
            status SMALLINT NOT NULL,
            exit_code INTEGER,
            created_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Task audit log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            arguments TEXT NOT NULL,
            stdout_file TEXT,
            stderr_file TEXT,
            wants_output BOOLEAN NOT NULL DEFAULT FALSE,
            exit_code INTEGER,
            stdout TEXT,
            stderr TEXT,
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS unit_variables (
            package_id UUID NOT NULL,
            unit_type VARCHAR(16) NOT NULL,
            variable VARCHAR(255) NOT NULL,
            value TEXT NOT NULL DEFAULT '',
            link_id VARCHAR(255),
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (package_id, variable)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Remembered answers to decision links
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decisions (
            package_id UUID NOT NULL,
            link_id VARCHAR(255) NOT NULL,
            choice TEXT NOT NULL,
            decided_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (package_id, link_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            id UUID PRIMARY KEY,
            package_id UUID NOT NULL,
            original_location TEXT NOT NULL,
            current_location TEXT NOT NULL,
            file_grp_use VARCHAR(64) NOT NULL DEFAULT 'original'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_packages_status ON packages(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_packages_current_path ON packages(current_path)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_package_id ON jobs(package_id, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tasks_job_id ON tasks(job_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_package_id ON files(package_id)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
