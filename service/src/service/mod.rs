mod function;

pub use self::function::{fn_build, fn_service, FnService};

use core::{future::Future, ops::Deref, pin::Pin};

/// Trait for simulate `Fn<(&Self, Arg)> -> impl Future<Output = Result<T, E>> + '_`.
/// The function call come from stateful type that can be referenced within returned opaque future.
pub trait Service<Req = ()> {
    /// The Ok part of output future.
    type Response;

    /// The Err part of output future.
    type Error;

    /// The output future that can reference Self with GAT lifetime.
    type Future<'f>: Future<Output = Result<Self::Response, Self::Error>>
    where
        Self: 'f,
        Req: 'f;

    fn call<'s>(&'s self, req: Req) -> Self::Future<'s>
    where
        Req: 's;
}

#[cfg(feature = "alloc")]
mod alloc_impl {
    use super::Service;

    use alloc::{boxed::Box, rc::Rc, sync::Arc};

    macro_rules! impl_alloc {
        ($alloc: ident) => {
            impl<S, Req> Service<Req> for $alloc<S>
            where
                S: Service<Req> + ?Sized,
            {
                type Response = S::Response;
                type Error = S::Error;
                type Future<'f> = S::Future<'f> where Self: 'f, Req: 'f;

                #[inline]
                fn call<'s>(&'s self, req: Req) -> Self::Future<'s>
                where
                    Req: 's,
                {
                    (**self).call(req)
                }
            }
        };
    }

    impl_alloc!(Box);
    impl_alloc!(Rc);
    impl_alloc!(Arc);
}

impl<S, Req> Service<Req> for Pin<S>
where
    S: Deref,
    S::Target: Service<Req>,
{
    type Response = <S::Target as Service<Req>>::Response;
    type Error = <S::Target as Service<Req>>::Error;
    type Future<'f> = <S::Target as Service<Req>>::Future<'f> where Self: 'f, Req: 'f;

    #[inline]
    fn call<'s>(&'s self, req: Req) -> Self::Future<'s>
    where
        Req: 's,
    {
        self.as_ref().get_ref().call(req)
    }
}
