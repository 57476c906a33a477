use rocket::Route;

mod admin;
mod catchers;
mod public;
mod voter;

#[cfg(test)]
mod test_helpers;

pub use catchers::catchers;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(admin::routes());
    routes.extend(public::routes());
    routes.extend(voter::routes());
    routes
}
