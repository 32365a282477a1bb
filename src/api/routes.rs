use std::convert::Infallible;
use warp::Filter;

use super::handlers::{self, AddChannelRequest, UploadRequest};
use crate::config::SettingsPatch;
use crate::control::ControlPlane;

const JSON_BODY_LIMIT: u64 = 64 * 1024;

/// Every operator route, with rejections rendered as JSON errors
pub fn routes(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = Infallible> + Clone {
    health_check()
        .or(status(control.clone()))
        .or(toggle_service(control.clone()))
        .or(channels(control.clone()))
        .or(recordings(control.clone()))
        .or(settings(control.clone()))
        .or(upload(control))
        .recover(handlers::handle_rejection)
        .with(warp::trace::request())
}

pub fn health_check() -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": "recorder-server",
            "version": env!("CARGO_PKG_VERSION")
        }))
    })
}

fn status(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "status")
        .and(warp::get())
        .and(with_control(control))
        .and_then(handlers::status)
}

fn toggle_service(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "service" / "toggle")
        .and(warp::post())
        .and(with_control(control))
        .and_then(handlers::toggle_service)
}

fn channels(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path!("api" / "channels")
        .and(warp::get())
        .and(with_control(control.clone()))
        .and_then(handlers::list_channels);

    let add = warp::path!("api" / "channels")
        .and(warp::post())
        .and(json_body::<AddChannelRequest>())
        .and(with_control(control.clone()))
        .and_then(handlers::add_channel);

    let remove = warp::path!("api" / "channels" / String)
        .and(warp::delete())
        .and(with_control(control.clone()))
        .and_then(handlers::remove_channel);

    let toggle = warp::path!("api" / "channels" / "toggle" / String)
        .and(warp::post())
        .and(with_control(control.clone()))
        .and_then(handlers::toggle_channel);

    let stop = warp::path!("api" / "recording" / "stop" / String)
        .and(warp::post())
        .and(with_control(control))
        .and_then(handlers::stop_recording);

    list.or(add).or(remove).or(toggle).or(stop)
}

fn recordings(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let list = warp::path!("api" / "recordings")
        .and(warp::get())
        .and(with_control(control.clone()))
        .and_then(handlers::list_recordings);

    let delete = warp::path!("api" / "recording" / String)
        .and(warp::delete())
        .and(with_control(control))
        .and_then(handlers::delete_recording);

    list.or(delete)
}

fn settings(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let get = warp::path!("api" / "settings")
        .and(warp::get())
        .and(with_control(control.clone()))
        .and_then(handlers::get_settings);

    let update = warp::path!("api" / "settings")
        .and(warp::post())
        .and(json_body::<SettingsPatch>())
        .and(with_control(control))
        .and_then(handlers::update_settings);

    get.or(update)
}

fn upload(
    control: ControlPlane,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path!("api" / "upload" / String)
        .and(warp::post())
        .and(json_body::<UploadRequest>())
        .and(with_control(control))
        .and_then(handlers::upload)
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(JSON_BODY_LIMIT).and(warp::body::json())
}

fn with_control(
    control: ControlPlane,
) -> impl Filter<Extract = (ControlPlane,), Error = Infallible> + Clone {
    warp::any().map(move || control.clone())
}
