//! Demonstration of the status coordinator: concurrent operations and
//! priority resolution

use apiary::{Status, StatusConfig, StatusKit};
use serde_json::json;

fn print_primary(status: &Status<&'static str>) {
    match status.primary() {
        Some(record) => println!(
            "showing [{}] for operation `{}` via {:?}",
            record.status_type,
            record.operation,
            status.component(&record.status_type)
        ),
        None => println!("all quiet"),
    }
}

fn main() {
    let kit = StatusKit::standard()
        .component("error", "ErrorBanner")
        .component("loading", "Spinner")
        .component("saving", "SaveIndicator");

    let status: Status<&'static str> = Status::new(StatusConfig {
        kit,
        ..StatusConfig::default()
    });

    // Unrelated UI regions report independently.
    status.operation("table").loading(json!({ "variant": "skeleton" }));
    status.operation("form").saving(json!({ "field": "email" }));
    print_primary(&status); // loading outranks saving

    // An error outranks everything in flight.
    status.operation("sync").error(json!({ "message": "offline" }));
    print_primary(&status);

    status.operation("sync").idle();
    status.operation("table").idle();
    print_primary(&status); // back to the save indicator

    status.operation("form").idle();
    print_primary(&status);

    println!("active: {:?}", status.active_operations());
}
