// /////////////////////////////////////////////////////////////////////////////
// Topology Policy
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Process entry point: parse the CLI, initialize logging, run the
//! engine's command loop, map the result to a Unix exit code.

use topology_policy_bootstrap::{app_runner, exit_code::ExitCode, Cli};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match Cli::parse_and_validate() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("CLI error: {e}");
            return std::process::ExitCode::from(ExitCode::UsageError.as_i32() as u8);
        }
    };

    topology_policy::infrastructure::logging::init(cli.verbose);

    let code = match app_runner::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fatal error");
            ExitCode::from_error(e.root_cause())
        }
    };

    std::process::ExitCode::from(code.as_i32() as u8)
}
