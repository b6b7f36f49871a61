pub trait F32Ext
where
    Self: Sized,
{
    fn sqr(self) -> Self;
    fn saturate(self) -> Self;
    fn inverse_sqrt(self) -> Self;

    /// Rounds towards zero and returns the result as an integer.
    fn abs_floor(self) -> i32;
}

impl F32Ext for f32 {
    fn sqr(self) -> Self {
        self * self
    }

    fn saturate(self) -> Self {
        self.clamp(0.0, 1.0)
    }

    fn inverse_sqrt(self) -> Self {
        1.0 / self.max(crate::RTGI_EPSILON).sqrt()
    }

    fn abs_floor(self) -> i32 {
        if self >= 0.0 {
            self.floor() as i32
        } else {
            self.ceil() as i32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_floor() {
        assert_eq!(1, 1.7f32.abs_floor());
        assert_eq!(-1, (-1.7f32).abs_floor());
        assert_eq!(0, (-0.3f32).abs_floor());
        assert_eq!(3, 3.0f32.abs_floor());
    }
}
