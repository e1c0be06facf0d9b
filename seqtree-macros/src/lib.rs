//! Procedural macros for seqtree
//!
//! This crate provides the `#[seqtree::test]` attribute macro, which runs an
//! async test body as a sequence on a driver with virtual time.
//!
//! ```rust,ignore
//! use seqtree::prelude::*;
//!
//! #[seqtree::test]
//! async fn waits_a_minute(seq: Sequence, clock: MockClock) -> Result<()> {
//!     seq.wait_for(Duration::from_secs(60)).await;
//!     assert_eq!(clock.now(), Duration::from_secs(60));
//!     Ok(())
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input, FnArg, Ident, ItemFn, Lit, ReturnType, Token, Type,
};

/// Arguments accepted by `#[seqtree::test(...)]`.
#[derive(Default)]
struct TreeArgs {
    /// Initial time for the mock clock, in seconds
    start_secs: Option<u64>,
    /// Cap on driver loop iterations
    max_ticks: Option<usize>,
    /// Whether the driver loop's sleeps move the clock (default: true)
    auto_advance: Option<bool>,
    /// Whether failures are contained instead of failing the test
    contain_failures: bool,
}

impl Parse for TreeArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = TreeArgs::default();

        while !input.is_empty() {
            let ident: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let lit: Lit = input.parse()?;

            match (ident.to_string().as_str(), lit) {
                ("start_time", Lit::Int(i)) => args.start_secs = Some(i.base10_parse()?),
                ("max_ticks", Lit::Int(i)) => args.max_ticks = Some(i.base10_parse()?),
                ("auto_advance", Lit::Bool(b)) => args.auto_advance = Some(b.value()),
                ("contain_failures", Lit::Bool(b)) => args.contain_failures = b.value(),
                ("start_time" | "max_ticks" | "auto_advance" | "contain_failures", lit) => {
                    return Err(syn::Error::new_spanned(
                        lit,
                        format!("unexpected value for {ident}"),
                    ));
                }
                _ => {
                    return Err(syn::Error::new(
                        ident.span(),
                        format!("unsupported seqtree::test argument `{ident}`"),
                    ));
                }
            }

            if !input.is_empty() {
                input.parse::<Token![,]>()?;
            }
        }

        Ok(args)
    }
}

/// What the test function asks the macro to inject.
#[derive(Debug, PartialEq, Eq)]
enum Injected {
    Sequence,
    Clock,
}

/// Classifies a parameter by the last segment of its type.
fn injected_param(arg: &FnArg) -> Option<Injected> {
    if let FnArg::Typed(pat_type) = arg {
        if let Type::Path(type_path) = &*pat_type.ty {
            if let Some(segment) = type_path.path.segments.last() {
                if segment.ident == "Sequence" {
                    return Some(Injected::Sequence);
                }
                if segment.ident == "MockClock" {
                    return Some(Injected::Clock);
                }
            }
        }
    }
    None
}

/// Test attribute macro running an async body as a sequence.
///
/// The body becomes the only top-level sequence of a
/// `seqtree::Driver` on an auto-advancing `MockClock`; the driver loop runs
/// until the tree is done and the test fails if any sequence failed.
///
/// # Parameters
///
/// - `seq: Sequence` - the body's own sequence handle
/// - `clock: MockClock` - the driver's clock
///
/// Both are optional and may come in any order.
///
/// # Return type
///
/// Either `()` or any `Result<T, E>` with `E: Into<seqtree::BoxError>`.
///
/// # Arguments
///
/// - `start_time = 100` - Mock clock reading at the first dispatch, in seconds
/// - `max_ticks = 1000` - Fail the test after this many dispatches
/// - `auto_advance = false` - Keep the clock still; time then only moves if
///   the body advances it
/// - `contain_failures = true` - Deliver failures only through result
///   channels instead of failing the test
///
/// ```rust,ignore
/// #[seqtree::test(start_time = 3600, max_ticks = 10)]
/// async fn one_hour_in(seq: Sequence, clock: MockClock) {
///     seq.wait_for(Duration::from_secs(1)).await;
///     assert_eq!(clock.now(), Duration::from_secs(3601));
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as TreeArgs);
    let body = parse_macro_input!(item as ItemFn);

    expand_test(args, body)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_test(args: TreeArgs, mut input: ItemFn) -> syn::Result<TokenStream2> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig,
            "#[seqtree::test] requires an async fn",
        ));
    }

    let mut call_args = Vec::new();
    for arg in &input.sig.inputs {
        match injected_param(arg) {
            Some(Injected::Sequence) => call_args.push(quote! { __seq.clone() }),
            Some(Injected::Clock) => call_args.push(quote! { __clock_arg.clone() }),
            None => {
                return Err(syn::Error::new_spanned(
                    arg,
                    "test parameters must be `Sequence` or `MockClock`",
                ));
            }
        }
    }

    let name = input.sig.ident.clone();
    let attrs = std::mem::take(&mut input.attrs);
    let vis = input.vis.clone();
    let body_fn = format_ident!("__seqtree_{}", name);
    input.sig.ident = body_fn.clone();
    input.vis = syn::Visibility::Inherited;

    let start_secs = args.start_secs.unwrap_or_default();
    let auto_advance = args.auto_advance.unwrap_or(true);
    let max_ticks = args.max_ticks.map(|ticks| quote! { .max_ticks(#ticks) });
    let policy = if args.contain_failures {
        quote! { ::seqtree::FailurePolicy::Contain }
    } else {
        quote! { ::seqtree::FailurePolicy::Propagate }
    };

    let spawn_body = match &input.sig.output {
        ReturnType::Default => quote! {
            move |__seq: ::seqtree::Sequence| async move {
                #body_fn(#(#call_args),*).await;
                ::core::result::Result::Ok::<(), ::seqtree::Error>(())
            }
        },
        ReturnType::Type(..) => quote! {
            move |__seq: ::seqtree::Sequence| #body_fn(#(#call_args),*)
        },
    };

    Ok(quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis fn #name() {
            #input

            let __clock = ::seqtree::clock::MockClock::with_start_time(
                ::std::time::Duration::from_secs(#start_secs)
            );
            __clock.set_auto_advance(#auto_advance);
            let __config = ::seqtree::DriverConfig::new()
                .failure_policy(#policy)
                #max_ticks;
            let __driver = ::seqtree::Driver::with_clock(__clock.clone(), __config);

            let __clock_arg = __clock.clone();
            let __result = __driver.spawn(stringify!(#name), #spawn_body);

            if let ::core::result::Result::Err(err) = __driver.run_until_done() {
                panic!("sequence tree failed: {err}");
            }
            match __result.try_read() {
                ::core::option::Option::Some(::core::result::Result::Ok(_)) => {}
                ::core::option::Option::Some(::core::result::Result::Err(err)) => {
                    panic!("test sequence failed: {err}");
                }
                ::core::option::Option::None => panic!("test sequence did not complete"),
            }
        }
    })
}
