use console::style;

use sqlsync_runtime::migrations::BoxFuture;
use sqlsync_runtime::{MigrationBatch, MigrationList, OperationResult, ResultHandler};

/// Prints the completed and pending migrations of each connection.
pub struct ListPrinter;

impl ResultHandler<MigrationList> for ListPrinter {
    fn on_success<'a>(&'a self, result: &'a OperationResult<MigrationList>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Some(list) = result.data() else {
                return;
            };

            println!("  {} {}", style("▸").cyan(), style(&result.connection_id).bold());
            for name in &list.completed {
                println!("    {} {}", style("✓").green(), name);
            }
            for name in &list.pending {
                println!("    {} {}", style("○").yellow(), style(name).dim());
            }

            if list.is_empty() {
                println!("    {}", style("No migrations.").dim());
            } else if list.pending.is_empty() {
                println!("    {}", style("Up to date.").dim());
            } else {
                println!(
                    "    {}",
                    style(format!("{} migration(s) yet to be run.", list.pending.len())).yellow()
                );
            }
            println!();
        })
    }

    fn on_failure<'a>(&'a self, result: &'a OperationResult<MigrationList>) -> BoxFuture<'a, ()> {
        print_failure(result)
    }
}

/// Prints the migrations applied or reverted on each connection.
pub struct BatchPrinter {
    verb: &'static str,
    nothing: &'static str,
}

impl BatchPrinter {
    pub fn applied() -> Self {
        Self {
            verb: "Applied",
            nothing: "Already up to date.",
        }
    }

    pub fn rolled_back() -> Self {
        Self {
            verb: "Rolled back",
            nothing: "Nothing to rollback.",
        }
    }
}

impl ResultHandler<MigrationBatch> for BatchPrinter {
    fn on_success<'a>(&'a self, result: &'a OperationResult<MigrationBatch>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Some(batch) = result.data() else {
                return;
            };

            println!("  {} {}", style("▸").cyan(), style(&result.connection_id).bold());
            if batch.is_empty() {
                println!("    {}", style(self.nothing).dim());
            } else {
                println!(
                    "    {} batch {} ({} migration(s))",
                    self.verb,
                    style(batch.batch).cyan(),
                    batch.names.len()
                );
                for name in &batch.names {
                    println!("    {} {}", style("✓").green(), name);
                }
            }
            println!();
        })
    }

    fn on_failure<'a>(&'a self, result: &'a OperationResult<MigrationBatch>) -> BoxFuture<'a, ()> {
        print_failure(result)
    }
}

fn print_failure<T>(result: &OperationResult<T>) -> BoxFuture<'_, ()>
where
    T: Sync,
{
    Box::pin(async move {
        println!(
            "  {} {} {}",
            style("▸").cyan(),
            style(&result.connection_id).bold(),
            style("- Failed").red()
        );
        if let Some(error) = result.error() {
            println!("    {} {}", style("✗").red(), error);
        }
        println!();
    })
}
