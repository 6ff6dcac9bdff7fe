// THEORY (single-pixel color heuristics):
// `Pixel` is the raw RGBA byte quadruple read out of a capture buffer. `ColorSample`
// is the floating-point average of many pixels (a sampled dot neighborhood) after
// optional white-balance gain. Both expose the same small set of heuristics, all
// computed from one color alone with no knowledge of neighbors or time:
// - Brightness:  channel mean, HSV value (max channel)
// - Color strength: chroma (max - min), HSV saturation (chroma / value)
// - Hue:         angle on the color wheel in degrees [0, 360)
//
// Hue is what the classifier leans on: it survives exposure and brightness shifts
// that move raw RGB coordinates far away from the palette.

pub mod pixel {
    pub type Channel = u8;
    pub type Hue = f32;
    pub type Saturation = f32;
    pub type Value = f32;

    pub const CHANNELS: usize = 4;

    /// A single RGBA pixel as stored in the capture buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
        pub alpha: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Self {
                red,
                green,
                blue,
                alpha,
            }
        }

        /// True when every color channel exceeds `threshold`.
        #[inline]
        pub fn all_channels_above(&self, threshold: Channel) -> bool {
            self.red > threshold && self.green > threshold && self.blue > threshold
        }
    }

    /// An averaged RGB color on the 0.0..=255.0 scale.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct ColorSample {
        pub red: f32,
        pub green: f32,
        pub blue: f32,
    }

    impl ColorSample {
        pub fn new(red: f32, green: f32, blue: f32) -> Self {
            Self { red, green, blue }
        }

        /// =================================Heuristics==================================

        /// Mean of the three channels.
        pub fn brightness(&self) -> f32 {
            (self.red + self.green + self.blue) / 3.0
        }

        /// HSV value: the brightest channel.
        pub fn value_hsv(&self) -> Value {
            self.red.max(self.green.max(self.blue))
        }

        pub fn chroma(&self) -> f32 {
            self.value_hsv() - self.red.min(self.green.min(self.blue))
        }

        /// HSV saturation in [0, 1]. Zero for black.
        pub fn saturation_hsv(&self) -> Saturation {
            let value = self.value_hsv();
            if value <= 1e-6 {
                return 0.0;
            }
            self.chroma() / value
        }

        /// Hue angle in degrees [0, 360). Zero for achromatic samples.
        pub fn hue(&self) -> Hue {
            let maximum_channel = self.value_hsv();
            let chroma = self.chroma();
            if chroma <= 1e-6 {
                return 0.0;
            }

            let (base_difference, sector_offset) = if maximum_channel == self.red {
                (self.green - self.blue, 0.0)
            } else if maximum_channel == self.green {
                (self.blue - self.red, 2.0)
            } else {
                (self.red - self.green, 4.0)
            };

            let mut hue_degrees = (base_difference / chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// Euclidean RGB distance.
        pub fn distance(&self, other: &ColorSample) -> f32 {
            let dr = self.red - other.red;
            let dg = self.green - other.green;
            let db = self.blue - other.blue;
            (dr * dr + dg * dg + db * db).sqrt()
        }

        /// Per-channel multiplication, clamped to the byte range.
        pub fn scaled(&self, gain: [f32; 3]) -> ColorSample {
            ColorSample::new(
                (self.red * gain[0]).min(255.0),
                (self.green * gain[1]).min(255.0),
                (self.blue * gain[2]).min(255.0),
            )
        }
    }

    /// Angular distance between two hues, in degrees [0, 180].
    pub fn hue_distance(a: Hue, b: Hue) -> Hue {
        let d = (a - b).abs() % 360.0;
        if d > 180.0 { 360.0 - d } else { d }
    }
}
