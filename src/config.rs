// glview/src/config.rs
//
//! Choosing an EGL config that matches a requested set of channel sizes.

use crate::egl_api::{attrib, EglApi, RenderableType};
use crate::Error;

/// The smallest depth buffer a relaxed chooser falls back to.
pub const MIN_DEPTH_SIZE: i32 = 16;

/// Bit depths of the color, depth, and stencil channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSizes {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub alpha: i32,
    pub depth: i32,
    pub stencil: i32,
}

impl ChannelSizes {
    #[inline]
    pub fn new(red: i32, green: i32, blue: i32, alpha: i32, depth: i32, stencil: i32)
               -> ChannelSizes {
        ChannelSizes { red, green, blue, alpha, depth, stencil }
    }

    fn to_attributes(&self) -> [i32; 12] {
        [
            attrib::RED_SIZE,       self.red,
            attrib::GREEN_SIZE,     self.green,
            attrib::BLUE_SIZE,      self.blue,
            attrib::ALPHA_SIZE,     self.alpha,
            attrib::DEPTH_SIZE,     self.depth,
            attrib::STENCIL_SIZE,   self.stencil,
        ]
    }
}

/// What a view asks of the driver's pixel format: channel sizes plus the ES client version the
/// config has to be renderable with (0 leaves the renderable type unconstrained).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConfigRequest {
    pub sizes: ChannelSizes,
    pub client_version: u8,
}

impl ConfigRequest {
    #[inline]
    pub fn new(sizes: ChannelSizes, client_version: u8) -> ConfigRequest {
        ConfigRequest { sizes, client_version }
    }
}

/// Picks the config a session creates its context and surfaces with.
pub trait ConfigChooser<E: EglApi>: Send + Sync {
    /// Any error is fatal to the session that asked.
    fn choose_config(&self, egl: &E, display: E::Display) -> Result<E::Config, Error>;
}

/// Chooses the first config, in driver order, whose red/green/blue/alpha sizes equal the request
/// and whose depth/stencil sizes are at least the request.
///
/// The driver is first asked for the configs passing a minimum filter. By default that filter is
/// the request itself; `with_minimum()` substitutes a looser one.
#[derive(Clone, Debug)]
pub struct ComponentSizeChooser {
    request: ConfigRequest,
    minimum: Option<ChannelSizes>,
    relax_depth: bool,
}

impl ComponentSizeChooser {
    pub fn new(request: ConfigRequest) -> ComponentSizeChooser {
        ComponentSizeChooser { request, minimum: None, relax_depth: false }
    }

    /// RGB 8/8/8 without alpha or stencil, with a 16-bit depth buffer if `with_depth` is set.
    pub fn simple(with_depth: bool, client_version: u8) -> ComponentSizeChooser {
        let depth = if with_depth { MIN_DEPTH_SIZE } else { 0 };
        ComponentSizeChooser::new(ConfigRequest::new(ChannelSizes::new(8, 8, 8, 0, depth, 0),
                                                     client_version))
    }

    /// Uses `minimum` instead of the request for the driver-side filter.
    pub fn with_minimum(mut self, minimum: ChannelSizes) -> ComponentSizeChooser {
        self.minimum = Some(minimum);
        self
    }

    /// When no candidate has exactly the requested depth, accept any depth of at least
    /// `MIN_DEPTH_SIZE` instead.
    pub fn relax_depth(mut self, relax: bool) -> ComponentSizeChooser {
        self.relax_depth = relax;
        self
    }

    #[inline]
    pub fn request(&self) -> &ConfigRequest {
        &self.request
    }

    /// The attribute list handed to the driver.
    pub fn config_spec(&self) -> Vec<i32> {
        let sizes = self.minimum.unwrap_or(self.request.sizes);
        let mut spec = sizes.to_attributes().to_vec();
        if let Some(renderable) = RenderableType::for_client_version(self.request.client_version) {
            spec.extend_from_slice(&[attrib::RENDERABLE_TYPE, renderable.bits()]);
        }
        spec.push(attrib::NONE);
        spec
    }

    /// The exact-match pass over configs the driver already filtered.
    pub fn choose_from<E>(&self, egl: &E, display: E::Display, configs: &[E::Config])
                          -> Option<E::Config>
                          where E: EglApi {
        let attr = |config: E::Config, name: i32| {
            egl.get_config_attrib(display, config, name).unwrap_or(0)
        };
        let wanted = self.request.sizes;

        let mut min_depth = wanted.depth;
        if self.relax_depth && !configs.iter().any(|&c| attr(c, attrib::DEPTH_SIZE) == min_depth) {
            debug!(target: "glview::egl",
                   "no config with depth {}, relaxing to {}",
                   min_depth,
                   MIN_DEPTH_SIZE);
            min_depth = MIN_DEPTH_SIZE;
        }

        configs.iter().copied().find(|&config| {
            attr(config, attrib::DEPTH_SIZE) >= min_depth &&
                attr(config, attrib::STENCIL_SIZE) >= wanted.stencil &&
                attr(config, attrib::RED_SIZE) == wanted.red &&
                attr(config, attrib::GREEN_SIZE) == wanted.green &&
                attr(config, attrib::BLUE_SIZE) == wanted.blue &&
                attr(config, attrib::ALPHA_SIZE) == wanted.alpha
        })
    }
}

impl<E> ConfigChooser<E> for ComponentSizeChooser where E: EglApi {
    fn choose_config(&self, egl: &E, display: E::Display) -> Result<E::Config, Error> {
        let spec = self.config_spec();

        // See how many applicable configs there are.
        let config_count = egl.config_count(display, &spec)
                              .map_err(Error::PixelFormatSelectionFailed)?;
        if config_count == 0 {
            return Err(Error::NoPixelFormatFound);
        }

        // Enumerate all those configs.
        let configs = egl.choose_configs(display, &spec, config_count)
                         .map_err(Error::PixelFormatSelectionFailed)?;

        self.choose_from(egl, display, &configs).ok_or(Error::NoPixelFormatFound)
    }
}
