use redis_lite::server::RedisServer;

#[tokio::main]
async fn main() {
    let server = match RedisServer::new(std::env::args()) {
        Ok(server) => server,
        Err(error) => {
            eprintln!("Failed to configure server: {}", error);
            std::process::exit(2);
        }
    };

    if let Err(error) = server.run().await {
        eprintln!("Failed to bind TCP listener: {}", error);
        std::process::exit(1);
    }
}
