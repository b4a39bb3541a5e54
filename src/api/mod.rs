pub mod auth;
pub mod ballot;
pub mod elections;
pub mod public;

/// All the API routes.
pub fn routes() -> Vec<rocket::Route> {
    let mut routes = Vec::new();
    routes.extend(auth::routes());
    routes.extend(elections::routes());
    routes.extend(ballot::routes());
    routes.extend(public::routes());
    routes
}
