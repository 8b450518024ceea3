//! # Oblivion Template Rendering
//!
//! File: cli/src/core/templating.rs
//!
//! ## Overview
//!
//! Small wrapper around Tera for the files the orchestrator generates at
//! bring-up time: the SQL that prepares the pgbouncer auth role on the primary
//! database, and the shell command that writes the pgbouncer `userlist.txt`.
//!
//! Rendered output routinely contains secret plaintext. Nothing here logs the
//! context values or the rendered text; only template names are traced.
//!
//! The user list command is not a template. It reads the credentials from the
//! exec environment, so no secret is ever spliced into shell text.
//!
//! ## Examples
//!
//! ```rust
//! let sql = templating::render(
//!     "bouncer-init.sql",
//!     templating::BOUNCER_INIT_SQL,
//!     &[("user", bouncer_user), ("password", bouncer_password)],
//! )?;
//! ```
//!
use crate::core::error::{OblivionError, Result};
use anyhow::{anyhow, Context};
use tera::Tera;
use tracing::debug;

/// Creates the pgbouncer auth role and the lookup function it queries.
pub const BOUNCER_INIT_SQL: &str = r#"
CREATE ROLE {{ user }} LOGIN;
-- set a password for the user
ALTER USER {{ user }} WITH PASSWORD '{{ password }}';

CREATE FUNCTION public.lookup (
   INOUT p_user     name,
   OUT   p_password text
) RETURNS record
   LANGUAGE sql SECURITY DEFINER SET search_path = pg_catalog AS
$$SELECT usename, passwd FROM pg_shadow WHERE usename = p_user$$;

-- make sure only the bouncer role can use the function
REVOKE EXECUTE ON FUNCTION public.lookup(name) FROM PUBLIC;
GRANT EXECUTE ON FUNCTION public.lookup(name) TO {{ user }};
"#;

/// Env var carrying the pgbouncer auth user into the user list exec.
pub const BOUNCER_USER_ENV: &str = "BOUNCER_USER";
/// Env var carrying the pgbouncer auth password into the user list exec.
pub const BOUNCER_PASSWORD_ENV: &str = "BOUNCER_PASSWORD";

/// Prints one `"user" "password"` line from the two env vars above.
pub const BOUNCER_USERLIST_LINE: &str =
    r#"printf '"%s" "%s"\n' "$BOUNCER_USER" "$BOUNCER_PASSWORD""#;

pub const BOUNCER_USERLIST_PATH: &str = "/etc/pgbouncer/userlist.txt";

/// Shell command writing the pgbouncer user list inside the bouncer container.
pub fn bouncer_userlist_cmd() -> String {
    format!("{} > {}", BOUNCER_USERLIST_LINE, BOUNCER_USERLIST_PATH)
}

/// Renders `template` with the given string variables.
///
/// Autoescaping is disabled: the output is SQL or shell text, not HTML.
pub fn render(name: &str, template: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut context = tera::Context::new();
    for (key, value) in vars {
        context.insert(*key, value);
    }
    debug!("Rendering template '{}'", name);
    Tera::one_off(template, &context, false)
        .map_err(|e| anyhow!(OblivionError::Template { source: e }))
        .with_context(|| format!("Tera rendering failed for template '{}'", name))
}
