//! Loopback fixture servers standing in for the mailbox provider and the
//! chat API during tests.

use axum::Router;

/// Serves `router` on an ephemeral local port and returns its base URL. The
/// server lives for the rest of the test process.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fixture server");
    let addr = listener.local_addr().expect("Fixture server has no addr");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("Fixture server crashed");
    });

    format!("http://{addr}")
}
