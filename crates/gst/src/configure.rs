//! Per-connection pipeline configuration.
//!
//! Runs on `media-configure`, once for every media the factory instantiates:
//!
//! 1. build the caps description of the session's frames
//! 2. install the session's CUDA `GstContext` on the media pipeline
//! 3. configure the `source` appsrc for time-stamped pushes with those caps
//! 4. derive the negotiated frame size from the caps
//! 5. size and activate a CUDA buffer pool of two frames
//! 6. drive the session's push cycle from appsrc `need-data`

use std::str::FromStr;
use std::sync::Arc;

use gst::prelude::*;
use gst_app::AppSrc;
use gst_rtsp_server::RTSPMedia;
use gst_rtsp_server::prelude::*;
use parking_lot::Mutex;

use cuda_rtsp_core::blueprint::{SOURCE_ELEMENT, session_caps};
use cuda_rtsp_core::{Error, FrameSource, PushCycle, Result};

use crate::CAT;
use crate::buffer::CudaBufferPool;
use crate::session::SessionResources;

/// Set up one media of the session.
///
/// Every media's `need-data` handler runs the session's single push cycle
/// under its lock, and that lock is held while waiting for a free buffer.
/// With one pipeline per client, a client whose pool is exhausted therefore
/// stalls frame production for all other clients of the session for up to
/// the session's acquire timeout (indefinitely with [`AcquireWait::Block`]).
///
/// [`AcquireWait::Block`]: cuda_rtsp_core::AcquireWait::Block
pub(crate) fn configure_media<S>(
    resources: &Arc<SessionResources>,
    producer: &Arc<Mutex<PushCycle<S>>>,
    media: &RTSPMedia,
) -> Result<()>
where
    S: FrameSource + 'static,
{
    let description = session_caps(&resources.config);
    let caps = gst::Caps::from_str(&description)
        .map_err(|e| Error::pipeline(format!("unparsable caps {description:?}: {e}")))?;

    let pipeline = media.element();
    pipeline.set_context(&resources.gst_context);

    let appsrc = find_source(&pipeline)?;
    appsrc.set_format(gst::Format::Time);
    appsrc.set_caps(Some(&caps));

    let frame_size = negotiated_frame_size(&caps)?;
    let pool = Arc::new(CudaBufferPool::new(&resources.cuda)?);
    pool.configure(&caps, frame_size)?;

    gst::debug!(
        CAT,
        obj = appsrc,
        "configured {} ({} bytes per frame)",
        description,
        frame_size
    );

    let need_data = {
        let resources = resources.clone();
        let producer = producer.clone();
        let pool = pool.clone();
        move |appsrc: &AppSrc, _length: u32| {
            let mut cycle = producer.lock();
            if let Err(err) = cycle.run(&*resources.gpu, &*pool, appsrc) {
                gst::warning!(CAT, obj = appsrc, "push cycle failed: {}", err);
                gst::element_error!(appsrc, gst::StreamError::Failed, ("push cycle failed"), ["{}", err]);
            }
        }
    };
    appsrc.set_callbacks(gst_app::AppSrcCallbacks::builder().need_data(need_data).build());

    media.connect_unprepared(move |_| pool.deactivate());

    tracing::info!(bytes = frame_size, caps = %description, "client pipeline configured");
    Ok(())
}

/// Report a configuration failure as an error on the media's pipeline.
pub(crate) fn fail_media(media: &RTSPMedia, err: &Error) {
    let pipeline = media.element();
    gst::error!(CAT, obj = pipeline, "media configuration failed: {}", err);
    gst::element_error!(pipeline, gst::CoreError::Negotiation, ("media configuration failed"), ["{}", err]);
}

fn find_source(pipeline: &gst::Element) -> Result<AppSrc> {
    let bin = pipeline
        .downcast_ref::<gst::Bin>()
        .ok_or_else(|| Error::pipeline("media element is not a bin"))?;
    bin.by_name(SOURCE_ELEMENT)
        .ok_or_else(|| Error::ElementNotFound(SOURCE_ELEMENT.to_string()))?
        .downcast::<AppSrc>()
        .map_err(|_| Error::pipeline(format!("`{SOURCE_ELEMENT}` is not an appsrc")))
}

/// Byte size of one frame described by raw video `caps`.
pub(crate) fn negotiated_frame_size(caps: &gst::Caps) -> Result<u32> {
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| Error::pipeline(format!("caps do not describe raw video: {e}")))?;
    u32::try_from(info.size())
        .map_err(|_| Error::pipeline(format!("frame of {} bytes too large for pool", info.size())))
}

#[cfg(test)]
mod tests {
    use cuda_rtsp_core::blueprint::caps_description;
    use cuda_rtsp_core::{FrameRate, PixelFormat};

    use super::*;

    fn caps(format: PixelFormat, width: u32, height: u32) -> gst::Caps {
        gst::init().unwrap();
        let description = caps_description(format, width, height, FrameRate::new(30, 1).unwrap());
        gst::Caps::from_str(&description).unwrap()
    }

    #[test]
    fn bgra_vga_frame_size() {
        let caps = caps(PixelFormat::Bgra, 640, 480);
        assert_eq!(negotiated_frame_size(&caps).unwrap(), 1_228_800);
    }

    #[test]
    fn nv12_vga_frame_size() {
        let caps = caps(PixelFormat::Nv12, 640, 480);
        assert_eq!(negotiated_frame_size(&caps).unwrap(), 460_800);
    }

    #[test]
    fn caps_keep_cuda_memory_feature() {
        let caps = caps(PixelFormat::Bgra, 640, 480);
        let features = caps.features(0).unwrap();
        assert!(features.contains("memory:CUDAMemory"));
        let s = caps.structure(0).unwrap();
        assert_eq!(s.get::<&str>("format").unwrap(), "BGRA");
        assert_eq!(s.get::<gst::Fraction>("framerate").unwrap(), gst::Fraction::new(30, 1));
    }

    #[test]
    fn non_video_caps_rejected() {
        gst::init().unwrap();
        let caps = gst::Caps::builder("audio/x-raw").build();
        assert!(negotiated_frame_size(&caps).is_err());
    }

    #[test]
    fn missing_source_element_reported() {
        gst::init().unwrap();
        let bin = gst::Bin::new();
        let err = find_source(bin.upcast_ref()).unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(name) if name == "source"));
    }
}
