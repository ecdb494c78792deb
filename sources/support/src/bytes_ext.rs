use anyhow::{anyhow, Result};
use bytes::Buf;
use paste::paste;

macro_rules! safe_buf {
    ($($ty: ident),*) => {
        paste! {
            /// Bounds-checked big-endian reads. The plain `Buf` getters panic on underflow.
            pub trait SafeBuf {
                $(
                    fn [<try_get_ $ty>](&mut self) -> Result<$ty>;
                )*

                fn try_skip(&mut self, count: usize) -> Result<()>;
            }

            impl<T: Buf> SafeBuf for T {
                $(
                    fn [<try_get_ $ty>](&mut self) -> Result<$ty> {
                        let needed = std::mem::size_of::<$ty>();
                        if self.remaining() < needed {
                            return Err(anyhow!(
                                "cannot read {} ({} bytes), only {} remaining",
                                stringify!($ty),
                                needed,
                                self.remaining()
                            ));
                        }

                        Ok(self.[<get_ $ty>]())
                    }
                )*

                fn try_skip(&mut self, count: usize) -> Result<()> {
                    if self.remaining() < count {
                        return Err(anyhow!(
                            "cannot skip {} bytes, only {} remaining",
                            count,
                            self.remaining()
                        ));
                    }

                    self.advance(count);
                    Ok(())
                }
            }
        }
    };
}

safe_buf!(u8, i8, u16, i16, u32, i32);
