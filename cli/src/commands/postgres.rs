//! # PostgreSQL Command (`oblivion postgres`)
//!
//! File: cli/src/commands/postgres.rs
//!
//! ## Overview
//!
//! `oblivion postgres up` brings up the database tier on the database network,
//! one step after the other:
//!
//! 1. **Primary**: WAL replication enabled, data in a named volume, and an init
//!    script that creates the pgbouncer auth role and its lookup function.
//!    Waits until `pg_isready` reports healthy.
//! 2. **Replica**: same image and health check, its own data volume.
//! 3. **Bouncer**: pgbouncer in front of the primary. When the container is
//!    newly created its `userlist.txt` is written with a detached exec.
//!
//! A failed step stops the sequence; later steps are not attempted.
//!
//! ## Credentials
//!
//! Six vault items are resolved in a single batch before anything is created.
//! They only ever reach the engine as container env, cmd or the generated
//! init file, never a log line.
//!
use crate::common::docker::health::POSTGRES_HEALTHCHECK;
use crate::common::docker::lifecycle::{bring_up, exec_detached, ContainerSpec, MountSpec, PortSpec};
use crate::common::secrets::Secret;
use crate::core::config::Config;
use crate::core::error::{OblivionError, Result};
use crate::core::resources::{Needs, Resources};
use crate::core::templating::{
    bouncer_userlist_cmd, render, BOUNCER_INIT_SQL, BOUNCER_PASSWORD_ENV, BOUNCER_USER_ENV,
};
use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::io::Write;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SECRET_KEYS: [&str; 6] = [
    "/Postgres/Replicator/username",
    "/Postgres/Replicator/password",
    "/Postgres/Root/username",
    "/Postgres/Root/password",
    "/Postgres/Bouncer/username",
    "/Postgres/Bouncer/password",
];

const DATA_DIR: &str = "/var/lib/postgresql/data";
const INIT_SQL_TARGET: &str = "/docker-entrypoint-initdb.d/bouncer-init.sql";

#[derive(Parser, Debug)]
pub struct PostgresArgs {
    #[command(subcommand)]
    command: PostgresCommand,
}

#[derive(Subcommand, Debug)]
enum PostgresCommand {
    /// Start the primary, the replica and pgbouncer, in that order.
    Up,
}

pub async fn handle_postgres(
    args: PostgresArgs,
    cfg: &Config,
    cancel: CancellationToken,
) -> Result<()> {
    match args.command {
        PostgresCommand::Up => {
            let res = Resources::connect(cfg, Needs { secrets: true }, cancel).await?;
            super::report("postgres", postgres_up(&res, cfg).await);
        }
    }
    Ok(())
}

struct Credential {
    user: Secret,
    password: Secret,
}

struct PostgresCredentials {
    replicator: Credential,
    root: Credential,
    bouncer: Credential,
}

impl PostgresCredentials {
    async fn load(res: &Resources) -> Result<Self> {
        let secrets = res.secrets()?.resolve(&SECRET_KEYS).await?;
        let mut values = secrets.into_iter();
        let mut pair = || -> Result<Credential> {
            match (values.next(), values.next()) {
                (Some(user), Some(password)) => Ok(Credential { user, password }),
                _ => Err(anyhow!(OblivionError::SecretStore(
                    "incomplete postgres credentials".into()
                ))),
            }
        };
        Ok(Self {
            replicator: pair()?,
            root: pair()?,
            bouncer: pair()?,
        })
    }
}

fn replication_cmd() -> Vec<String> {
    [
        "-c",
        "wal_level=replica",
        "-c",
        "max_wal_senders=10",
        "-c",
        "max_replication_slots=10",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn base_env(cfg: &Config, creds: &PostgresCredentials) -> Vec<String> {
    vec![
        format!("POSTGRES_DB={}", cfg.postgres.db),
        format!("POSTGRES_USER={}", creds.root.user.expose()),
        format!("POSTGRES_PASSWORD={}", creds.root.password.expose()),
        "POSTGRES_HOST_AUTH_METHOD=scram-sha-256".into(),
    ]
}

/// Writes the rendered init SQL to a temp file that lives as long as the
/// returned handle.
fn write_init_sql(creds: &PostgresCredentials) -> Result<NamedTempFile> {
    let sql = render(
        "bouncer-init.sql",
        BOUNCER_INIT_SQL,
        &[
            ("user", creds.bouncer.user.expose()),
            ("password", creds.bouncer.password.expose()),
        ],
    )?;
    let mut file = tempfile::Builder::new()
        .prefix("temp-postgres-bouncer-init-")
        .suffix(".sql")
        .tempfile()
        .context("Failed to create temp file for bouncer init SQL")?;
    file.write_all(sql.as_bytes())
        .and_then(|_| file.flush())
        .context("Failed to write bouncer init SQL")?;
    debug!("Wrote bouncer init SQL to {}", file.path().display());
    Ok(file)
}

fn primary_spec(cfg: &Config, creds: &PostgresCredentials, init_sql: &str) -> ContainerSpec {
    let pg = &cfg.postgres;
    let mut env = base_env(cfg, creds);
    env.push(format!(
        "POSTGRES_REPLICATION_USER={}",
        creds.replicator.user.expose()
    ));
    env.push(format!(
        "POSTGRES_REPLICATION_PASSWORD={}",
        creds.replicator.password.expose()
    ));
    ContainerSpec {
        cmd: replication_cmd(),
        env,
        ports: vec![PortSpec::new(5432, pg.primary_port)],
        mounts: vec![
            MountSpec::volume(&pg.primary_data_vol, DATA_DIR),
            MountSpec::bind(init_sql, INIT_SQL_TARGET),
        ],
        networks: vec![cfg.networks.database_network_name.clone()],
        healthcheck: Some(&POSTGRES_HEALTHCHECK),
        ..ContainerSpec::new(&pg.primary_name, &pg.primary_image)
    }
}

fn replica_spec(cfg: &Config, creds: &PostgresCredentials) -> ContainerSpec {
    let pg = &cfg.postgres;
    let mut env = base_env(cfg, creds);
    env.push(format!("PGDATA={}", DATA_DIR));
    ContainerSpec {
        cmd: replication_cmd(),
        env,
        mounts: vec![MountSpec::volume(&pg.replica_data_vol, DATA_DIR)],
        networks: vec![cfg.networks.database_network_name.clone()],
        healthcheck: Some(&POSTGRES_HEALTHCHECK),
        ..ContainerSpec::new(&pg.replica_name, &pg.replica_image)
    }
}

fn bouncer_spec(cfg: &Config, creds: &PostgresCredentials) -> ContainerSpec {
    let pg = &cfg.postgres;
    let mut env = vec![
        format!("DB_HOST={}", pg.primary_name),
        "DB_PORT=5432".to_string(),
        format!("AUTH_USER={}", creds.bouncer.user.expose()),
    ];
    env.extend(
        [
            "AUTH_FILE=/etc/pgbouncer/userlist.txt",
            "AUTH_TYPE=scram-sha-256",
            "AUTH_QUERY=SELECT p_user, p_password FROM public.lookup($1)",
            "LISTEN_PORT=6432",
            "LISTEN_ADDR=0.0.0.0",
            "POOL_MODE=session",
            "MAX_CLIENT_CONN=250",
            "DEFAULT_POOL_SIZE=20",
            "MIN_POOL_SIZE=5",
            "RESERVE_POOL_SIZE=10",
            "SERVER_RESET_QUERY=DISCARD ALL",
            "SERVER_CHECK_QUERY=SELECT 1",
            "SERVER_CHECK_DELAY=30",
            "IGNORE_STARTUP_PARAMETERS=extra_float_digits",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    ContainerSpec {
        env,
        ports: vec![PortSpec::new(6432, pg.bouncer_port)],
        networks: vec![cfg.networks.database_network_name.clone()],
        ..ContainerSpec::new(&pg.bouncer_name, &pg.bouncer_image)
    }
}

pub async fn postgres_up(res: &Resources, cfg: &Config) -> Result<()> {
    let creds = PostgresCredentials::load(res).await?;

    {
        let init_sql = write_init_sql(&creds)?;
        let path = init_sql.path().to_string_lossy().into_owned();
        bring_up(res, &primary_spec(cfg, &creds, &path))
            .await
            .context("primary postgres")?;
        // The temp file is removed here, once the primary has initialized.
    }

    bring_up(res, &replica_spec(cfg, &creds))
        .await
        .context("replica postgres")?;

    let bouncer = bring_up(res, &bouncer_spec(cfg, &creds))
        .await
        .context("pgbouncer")?;
    if bouncer.created {
        exec_detached(
            res.engine(),
            &bouncer.handle,
            vec!["/bin/sh".into(), "-c".into(), bouncer_userlist_cmd()],
            vec![
                format!("{}={}", BOUNCER_USER_ENV, creds.bouncer.user.expose()),
                format!("{}={}", BOUNCER_PASSWORD_ENV, creds.bouncer.password.expose()),
            ],
        )
        .await?;
        info!("Wrote pgbouncer user list");
    }
    Ok(())
}
