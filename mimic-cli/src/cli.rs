// Copyright ⓒ 2024-2025 Peter Morgan <peter.james.morgan@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::process;

use crate::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

mod check;
mod run;

#[derive(Clone, Debug, Parser)]
#[command(name = "mimic", version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[clap(flatten)]
    run: run::Arg,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Serve mocks for OpenAPI and AsyncAPI descriptions [default if no command supplied]
    Run(Box<run::Arg>),

    /// Load, resolve and patch descriptions, then summarise them
    Check(check::Arg),
}

impl Cli {
    pub async fn main() -> Result<()> {
        debug!(pid = process::id());

        let cli = Cli::parse();

        match cli.command.unwrap_or(Command::Run(Box::new(cli.run))) {
            Command::Run(arg) => arg
                .main()
                .await
                .inspect(|result| debug!(?result))
                .inspect_err(|err| debug!(?err)),

            Command::Check(arg) => arg.main(),
        }
    }
}
